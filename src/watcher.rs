use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use notify::{
    event::{ModifyKind, RenameMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::command::Registry;

const CHANNEL_CAPACITY: usize = 64;

/// Reloads the registry whenever its commands file changes. Stops when dropped.
pub struct ReloadWatcher {
    task: JoinHandle<()>,
}

impl ReloadWatcher {
    pub fn spawn(registry: Arc<Registry>, debounce: Duration) -> Result<Self> {
        let file = registry.path().to_path_buf();
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel::<Event>(CHANNEL_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    // one event per burst is enough
                    let _ = tx.try_send(event);
                }
            },
            notify::Config::default(),
        )
        .context("couldn't create file watcher")?;

        // Editors often replace the file, so the directory is watched too.
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("couldn't watch {}", dir.display()))?;
        watch_file(&mut watcher, &file);

        info!(path = %file.display(), "watching commands file");
        let task = tokio::spawn(reload_loop(watcher, rx, registry, file, debounce));
        Ok(ReloadWatcher { task })
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn reload_loop(
    mut watcher: RecommendedWatcher,
    mut rx: mpsc::Receiver<Event>,
    registry: Arc<Registry>,
    file: PathBuf,
    debounce: Duration,
) {
    while let Some(event) = rx.recv().await {
        if !is_relevant(&event, &file) {
            continue;
        }
        let mut recreated = is_create(&event);

        tokio::time::sleep(debounce).await;
        while let Ok(event) = rx.try_recv() {
            recreated |= is_relevant(&event, &file) && is_create(&event);
        }

        if recreated {
            watch_file(&mut watcher, &file);
        }

        debug!(path = %file.display(), "commands file changed");
        if let Err(e) = registry.reload() {
            error!("keeping previous commands: {e}");
        }
    }
}

fn watch_file(watcher: &mut RecommendedWatcher, file: &Path) {
    if let Err(e) = watcher.watch(file, RecursiveMode::NonRecursive) {
        warn!(path = %file.display(), "couldn't watch commands file directly: {e}");
    }
}

/// True when the event writes or creates the commands file.
pub fn is_relevant(event: &Event, file: &Path) -> bool {
    let touches_file = event
        .paths
        .iter()
        .any(|path| path.file_name().is_some() && path.file_name() == file.file_name());

    touches_file && matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Creations and renames onto the path both replace the watched inode.
fn is_create(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    )
}
