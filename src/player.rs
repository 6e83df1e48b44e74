use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;
use tracing::warn;

use crate::context::NowPlaying;

pub const NOTHING_PLAYING: &str = "No songs playing right now...";

/// The document the media watcher publishes whenever the track changes.
#[derive(Deserialize, Debug, Default)]
pub struct SongInfo {
    #[serde(default, rename = "imgUrl")]
    pub img_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
}

impl SongInfo {
    pub fn display(&self) -> String {
        let mut parts = vec![self.artist.as_str(), self.title.as_str()];
        if !self.img_url.is_empty() {
            parts.push(self.img_url.as_str());
        }
        parts.join(" - ")
    }
}

/// Reads the now-playing document from disk on every request.
pub struct Player {
    source: Option<PathBuf>,
}

impl Player {
    pub fn new(source: Option<PathBuf>) -> Self {
        Player { source }
    }

    fn read(&self) -> Result<Option<SongInfo>> {
        let Some(path) = &self.source else { return Ok(None) };
        let contents = std::fs::read_to_string(path)?;
        let info: SongInfo = serde_json::from_str(&contents)?;
        if info.title.is_empty() {
            return Ok(None);
        }
        Ok(Some(info))
    }
}

impl NowPlaying for Player {
    fn current_track(&self) -> String {
        match self.read() {
            Ok(Some(info)) => info.display(),
            Ok(None) => NOTHING_PLAYING.to_string(),
            Err(e) => {
                warn!("couldn't read the current song: {e:#}");
                NOTHING_PLAYING.to_string()
            }
        }
    }
}
