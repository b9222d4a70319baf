use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything the announcer persists, loaded from herald.toml.
/// Missing fields fall back to their defaults, so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default synthesis voice; `None` lets the engine pick.
    pub voice_id: Option<String>,
    /// Speech rate in words per minute.
    pub rate: u32,
    /// Playback volume, 0.0..=1.0.
    pub volume: f32,
    /// Maximum announcements buffered for playback.
    pub max_queue_size: usize,
    /// Pause between announcements, in seconds.
    pub message_delay_secs: f32,
    /// Most recent chat lines kept in the visible log.
    pub max_chat_lines: usize,
    /// Channel joined on the last connect; used as the default next time.
    pub last_channel: String,
    /// Users never announced (case-insensitive).
    pub blacklist: BTreeSet<String>,
    /// Per-user voice overrides, username -> voice id.
    pub user_voices: BTreeMap<String, String>,
    pub server: ServerSection,
    pub auth: AuthSection,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice_id: None,
            rate: 175,
            volume: 1.0,
            max_queue_size: 10,
            message_delay_secs: 1.0,
            max_chat_lines: 25,
            last_channel: String::new(),
            blacklist: BTreeSet::new(),
            user_voices: BTreeMap::new(),
            server: ServerSection::default(),
            auth: AuthSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "irc.chat.twitch.tv".into(),
            port: 6667,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthSection {
    /// OAuth token, including the `oauth:` prefix.
    pub token: String,
    /// The bot account's username.
    pub username: String,
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults when the
    /// file does not exist. Environment variables override file values.
    pub fn load(path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("failed to parse settings file {}", path.display()))?
        } else {
            info!("no settings file at {}, using defaults", path.display());
            Settings::default()
        };

        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Write the settings back out as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize settings")?;
        std::fs::write(path.as_ref(), contents).with_context(|| {
            format!("failed to write settings file {}", path.as_ref().display())
        })?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HERALD_TOKEN") {
            self.auth.token = v;
        }
        if let Ok(v) = std::env::var("HERALD_USERNAME") {
            self.auth.username = v;
        }
        if let Ok(v) = std::env::var("HERALD_SERVER") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("HERALD_PORT")
            && let Ok(port) = v.parse()
        {
            self.server.port = port;
        }
    }

    /// Pause between announcements.
    pub fn message_delay(&self) -> Duration {
        Duration::from_secs_f32(self.message_delay_secs.max(0.0))
    }

    /// Case-insensitive blacklist check.
    pub fn is_blacklisted(&self, user: &str) -> bool {
        let user = user.to_lowercase();
        self.blacklist.iter().any(|entry| entry.to_lowercase() == user)
    }

    /// Voice override for a user, if one is configured.
    pub fn voice_for(&self, user: &str) -> Option<&str> {
        let user = user.to_lowercase();
        self.user_voices
            .iter()
            .find(|(name, _)| name.to_lowercase() == user)
            .map(|(_, voice)| voice.as_str())
    }
}
