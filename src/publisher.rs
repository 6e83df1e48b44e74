use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::Publisher;

/// One published message, as the overlay daemons read it.
#[derive(Serialize, Deserialize, PartialEq, Debug)]
pub struct Envelope {
    pub topic: String,
    pub body: String,
    /// Unix seconds.
    pub published_at: u64,
}

/// Publishes by replacing `<dir>/<topic>.json`, which the overlays watch.
pub struct SpoolPublisher {
    dir: PathBuf,
}

impl SpoolPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SpoolPublisher { dir: dir.into() }
    }
}

impl Publisher for SpoolPublisher {
    fn publish(&self, topic: &str, body: &str) -> Result<()> {
        let published_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let envelope = Envelope {
            topic: topic.to_string(),
            body: body.to_string(),
            published_at,
        };

        let path = self.dir.join(format!("{topic}.json"));
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(&envelope)?)
            .with_context(|| format!("couldn't write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("couldn't publish {}", path.display()))?;

        debug!(topic, path = %path.display(), "published");
        Ok(())
    }
}

/// Used when no spool directory is configured.
pub struct Disabled;

impl Publisher for Disabled {
    fn publish(&self, topic: &str, _: &str) -> Result<()> {
        bail!("publishing to {topic} is not configured")
    }
}
