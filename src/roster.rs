use std::{
    collections::{btree_map::Entry, BTreeMap},
    path::PathBuf,
    time::SystemTime,
};

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::context::Members;

/// Shared persistence for the roster, so other processes can see who is in chat.
pub trait RosterStore: Send + Sync {
    fn replace(&self, members: &[String]) -> Result<()>;
}

/// Writes the full member list as a JSON array, replacing the file atomically.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }
}

impl RosterStore for JsonFileStore {
    fn replace(&self, members: &[String]) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(members)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Channel members with the time each one was first seen, kept in memory and
/// mirrored to an optional store. Also remembers the links people post.
pub struct Roster {
    members: RwLock<BTreeMap<String, SystemTime>>,
    urls: RwLock<BTreeMap<String, Vec<String>>>,
    store: Option<Box<dyn RosterStore>>,
}

impl Roster {
    pub fn new(store: Option<Box<dyn RosterStore>>) -> Self {
        let roster = Roster {
            members: RwLock::new(BTreeMap::new()),
            urls: RwLock::new(BTreeMap::new()),
            store,
        };
        roster.persist();
        roster
    }

    /// Keeps the first join time when the server repeats a name.
    pub fn add_user(&self, name: &str) {
        let joined = match self.members.write().entry(name.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(SystemTime::now());
                true
            }
            Entry::Occupied(_) => false,
        };
        if joined {
            debug!(user = name, "joined");
            self.persist();
        }
    }

    pub fn remove_user(&self, name: &str) {
        if self.members.write().remove(name).is_some() {
            debug!(user = name, "left");
            self.persist();
        }
    }

    /// Forgets who is in chat. Shared links survive, they outlive a connection.
    pub fn clear(&self) {
        self.members.write().clear();
        self.persist();
    }

    /// Remembers every `http://` or `https://` word of a chat message.
    pub fn record_urls(&self, name: &str, message: &str) {
        let found: Vec<String> = message
            .split_whitespace()
            .filter(|word| word.starts_with("https://") || word.starts_with("http://"))
            .map(str::to_string)
            .collect();
        if found.is_empty() {
            return;
        }
        debug!(user = name, count = found.len(), "shared urls");
        self.urls
            .write()
            .entry(name.to_lowercase())
            .or_default()
            .extend(found);
    }

    // A failing store never takes the in-memory roster down with it.
    fn persist(&self) {
        let Some(store) = &self.store else { return };
        let members = self.members_sorted();
        if let Err(e) = store.replace(&members) {
            warn!("couldn't persist roster, continuing in memory: {e:#}");
        }
    }
}

impl Members for Roster {
    fn members_sorted(&self) -> Vec<String> {
        self.members.read().keys().cloned().collect()
    }

    fn joined_at(&self, name: &str) -> Option<SystemTime> {
        self.members.read().get(name).copied()
    }

    fn shared_urls(&self, name: Option<&str>) -> Vec<(String, Vec<String>)> {
        let urls = self.urls.read();
        match name {
            Some(name) => urls
                .get(name)
                .map(|shared| vec![(name.to_string(), shared.clone())])
                .unwrap_or_default(),
            None => urls
                .iter()
                .map(|(user, shared)| (user.clone(), shared.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use anyhow::bail;

    use super::*;

    struct BrokenStore(Arc<AtomicUsize>);

    impl RosterStore for BrokenStore {
        fn replace(&self, _: &[String]) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            bail!("connection refused")
        }
    }

    #[test]
    fn members_are_sorted_and_unique() {
        let roster = Roster::new(None);
        for name in ["zed", "ana", "mia", "ana"] {
            roster.add_user(name);
        }
        roster.remove_user("mia");
        roster.remove_user("never-joined");
        assert_eq!(roster.members_sorted(), vec!["ana", "zed"]);
    }

    #[test]
    fn join_time_is_kept_from_the_first_join() {
        let roster = Roster::new(None);
        let before = SystemTime::now();
        roster.add_user("ana");
        let first = roster.joined_at("ana").expect("joined");
        roster.add_user("ana");

        assert!(first >= before);
        assert_eq!(roster.joined_at("ana"), Some(first));
        assert_eq!(roster.joined_at("bia"), None);

        roster.remove_user("ana");
        assert_eq!(roster.joined_at("ana"), None);
    }

    #[test]
    fn urls_are_collected_per_user() {
        let roster = Roster::new(None);
        roster.record_urls("Ana", "olha https://a.dev e http://b.dev");
        roster.record_urls("ana", "mais uma https://c.dev");
        roster.record_urls("bia", "no links here, just ftp://old.example");
        roster.record_urls("zed", "https://z.dev");

        let ana = vec!["https://a.dev", "http://b.dev", "https://c.dev"];
        assert_eq!(
            roster.shared_urls(Some("ana")),
            vec![("ana".to_string(), ana.iter().map(|u| u.to_string()).collect())]
        );
        assert!(roster.shared_urls(Some("bia")).is_empty());

        let everyone: Vec<String> = roster
            .shared_urls(None)
            .into_iter()
            .map(|(user, _)| user)
            .collect();
        assert_eq!(everyone, vec!["ana", "zed"]);

        roster.clear();
        assert_eq!(roster.shared_urls(None).len(), 2);
    }

    #[test]
    fn failing_store_fails_open() {
        let calls = Arc::new(AtomicUsize::new(0));
        let roster = Roster::new(Some(Box::new(BrokenStore(Arc::clone(&calls)))));
        roster.add_user("ana");
        roster.add_user("bia");
        roster.remove_user("ana");

        assert_eq!(roster.members_sorted(), vec!["bia"]);
        // one reset on creation plus three changes
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn json_store_mirrors_membership() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roster.json");
        let roster = Roster::new(Some(Box::new(JsonFileStore::new(&path))));
        roster.add_user("bia");
        roster.add_user("ana");

        let read = || -> Vec<String> {
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json")
        };
        assert_eq!(read(), vec!["ana", "bia"]);

        roster.clear();
        assert!(read().is_empty());
    }
}
