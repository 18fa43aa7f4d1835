use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tracing::info;

use crate::types::{Rgb, TeamColorEntry};

/// Used for any team without a colour of its own.
pub const DEFAULT_COLOR: Rgb = Rgb(231, 76, 60);

/// (canonical name, aliases, colour)
const BUILTIN_TEAMS: &[(&str, &[&str], Rgb)] = &[
    ("Sentinels", &["sen"], Rgb(206, 14, 45)),
    ("FNATIC", &["fnc"], Rgb(255, 88, 0)),
    ("G2 Esports", &["g2"], Rgb(237, 28, 36)),
    ("Paper Rex", &["prx"], Rgb(143, 80, 237)),
    ("Team Heretics", &["th", "heretics"], Rgb(215, 177, 94)),
    ("LOUD", &[], Rgb(19, 255, 0)),
    ("DRX", &[], Rgb(36, 80, 200)),
    ("Team Liquid", &["tl", "liquid"], Rgb(10, 36, 70)),
    ("NRG", &["nrg esports"], Rgb(232, 232, 232)),
    ("100 Thieves", &["100t"], Rgb(232, 44, 44)),
    ("Gen.G", &["geng", "gen g", "gen.g esports"], Rgb(170, 132, 36)),
    ("EDward Gaming", &["edg"], Rgb(35, 31, 32)),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAliases {
    pub teams: Vec<TeamAliasEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAliasEntry {
    /// Display name every alias resolves to.
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// `#RRGGBB`.
    #[serde(default)]
    pub color: Option<String>,
}

/// Alias and colour lookups for team names. Lookups never fail: unknown names
/// pass through and get [`DEFAULT_COLOR`].
#[derive(Debug, Clone, Default)]
pub struct TeamDirectory {
    /// lowercase alias (or canonical) -> canonical display name
    aliases: HashMap<String, String>,
    /// team key -> colour
    colors: HashMap<String, Rgb>,
}

/// Whitespace collapsed, surrounding blanks removed.
pub fn clean_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn team_key(name: &str) -> String {
    clean_name(name).to_lowercase()
}

fn parse_hex_color(text: &str) -> Option<Rgb> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(Rgb(channel(0)?, channel(2)?, channel(4)?))
}

impl TeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_teams() -> Self {
        let mut directory = Self::new();
        for (canonical, aliases, color) in BUILTIN_TEAMS {
            for alias in aliases.iter() {
                directory.add_alias(alias, canonical);
            }
            directory.add_alias(canonical, canonical);
            directory.set_color(canonical, *color);
        }
        directory
    }

    /// Builtin teams plus the entries of a JSON alias file, file entries winning.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read team aliases file {}", path.display()))?;
        let config: TeamAliases =
            serde_json::from_str(&content).context("Failed to parse team aliases JSON")?;

        let mut directory = Self::with_builtin_teams();
        for entry in config.teams {
            directory.add_alias(&entry.canonical, &entry.canonical);
            for alias in &entry.aliases {
                directory.add_alias(alias, &entry.canonical);
            }
            if let Some(color) = entry.color.as_deref().and_then(parse_hex_color) {
                directory.set_color(&entry.canonical, color);
            }
        }

        info!("Loaded {} team alias mappings", directory.aliases.len());
        Ok(directory)
    }

    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases.insert(team_key(alias), clean_name(canonical));
    }

    pub fn set_color(&mut self, name: &str, color: Rgb) {
        let key = team_key(&self.canonical(name));
        self.colors.insert(key, color);
    }

    /// Canonical display name for `name`, or the cleaned name itself.
    pub fn canonical(&self, name: &str) -> String {
        let cleaned = clean_name(name);
        self.aliases
            .get(&cleaned.to_lowercase())
            .cloned()
            .unwrap_or(cleaned)
    }

    pub fn names_match(&self, a: &str, b: &str) -> bool {
        team_key(&self.canonical(a)) == team_key(&self.canonical(b))
    }

    pub fn color_for(&self, name: &str) -> Rgb {
        self.color_entry(name).color
    }

    pub fn color_entry(&self, name: &str) -> TeamColorEntry {
        let team_key = team_key(&self.canonical(name));
        let color = self.colors.get(&team_key).copied().unwrap_or(DEFAULT_COLOR);
        TeamColorEntry { team_key, color }
    }
}
