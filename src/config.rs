use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Config {
    pub twitch_cfg: TwitchConfig,
    #[serde(default)]
    pub bot_cfg: BotConfig,
}

impl Config {
    pub fn build(path: &str) -> Result<Config> {
        let file_contents = std::fs::read_to_string(path)
            .with_context(|| format!("couldn't read settings from {path}"))?;
        let config: Config = toml::from_str(&file_contents)
            .with_context(|| format!("invalid settings in {path}"))?;

        Ok(config)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TwitchConfig {
    #[serde(default = "default_irc_host")]
    pub irc_host: String,
    #[serde(default = "default_irc_port")]
    pub irc_port: u16,
    pub account: String,
    pub channel: String,
    /// Login (or user id) allowed to run admin commands. Defaults to the channel.
    #[serde(default)]
    pub owner: String,
    pub token_path: String,
}

impl TwitchConfig {
    pub fn owner(&self) -> &str {
        if self.owner.is_empty() {
            &self.channel
        } else {
            &self.owner
        }
    }
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            irc_host: default_irc_host(),
            irc_port: default_irc_port(),
            account: Default::default(),
            channel: Default::default(),
            owner: Default::default(),
            token_path: Default::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BotConfig {
    pub commands_path: PathBuf,
    pub reload_debounce_ms: u64,
    pub reconnect_delay_secs: u64,
    /// User ids whose messages are never dispatched, e.g. other bots.
    pub ignored_senders: Vec<String>,
    pub greeting: String,
    pub greeting_color: String,
    pub unique_chat: bool,
    /// Slow mode, in seconds, applied after the greeting.
    pub slow_mode_secs: Option<u32>,
    pub roster_path: Option<PathBuf>,
    pub now_playing_path: Option<PathBuf>,
    /// Spool directory for overlay updates such as the marquee.
    pub publish_dir: Option<PathBuf>,
    pub log_filter: String,
}

impl BotConfig {
    pub fn reload_debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            commands_path: PathBuf::from("commands.yaml"),
            reload_debounce_ms: 1000,
            reconnect_delay_secs: 5,
            // Streamlabs
            ignored_senders: vec!["105166207".to_string()],
            greeting: "Tô na área!".to_string(),
            greeting_color: "seagreen".to_string(),
            unique_chat: true,
            slow_mode_secs: None,
            roster_path: None,
            now_playing_path: None,
            publish_dir: None,
            log_filter: "info".to_string(),
        }
    }
}

fn default_irc_host() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_irc_port() -> u16 {
    6667
}
