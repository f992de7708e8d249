//! File-per-record collections.
//!
//! A collection is a directory of `<id>.yml` files and the single access path
//! to an entity type. The filesystem doubles as the publish/subscribe bus
//! between host and child: readers re-load a record when its file mtime moves
//! past the cached read stamp, so cross-process writes become visible on the
//! next `get` without invalidation traffic.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::fsutil::write_creating_dirs;

struct Cached<T> {
    value: T,
    /// File mtime observed at the last disk read; `None` for records that
    /// only exist in memory so far.
    mtime: Option<SystemTime>,
}

pub struct Collection<T> {
    dir: PathBuf,
    extension: &'static str,
    cache: HashMap<String, Cached<T>>,
    dirty: HashSet<String>,
    deleted: HashSet<String>,
}

impl<T: Serialize + DeserializeOwned + Clone> Collection<T> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_extension(dir, "yml")
    }

    /// Templates ship as `<name>.yaml`; db records as `<id>.yml`.
    pub fn with_extension(dir: impl Into<PathBuf>, extension: &'static str) -> Self {
        Self {
            dir: dir.into(),
            extension,
            cache: HashMap::new(),
            dirty: HashSet::new(),
            deleted: HashSet::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{}", self.extension))
    }

    /// Fetch a record, re-reading the file when its mtime is strictly newer
    /// than the cached read stamp. Unsaved local writes always win.
    pub fn get(&mut self, id: &str) -> Option<T> {
        if self.deleted.contains(id) {
            return None;
        }
        if self.dirty.contains(id) {
            return self.cache.get(id).map(|c| c.value.clone());
        }

        let path = self.record_path(id);
        let disk_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

        let stale = match (self.cache.get(id), disk_mtime) {
            (Some(cached), Some(on_disk)) => cached.mtime.is_none_or(|seen| on_disk > seen),
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => return None,
        };

        if stale {
            match self.read_record(&path) {
                Some(value) => {
                    self.cache.insert(
                        id.to_string(),
                        Cached {
                            value,
                            mtime: disk_mtime,
                        },
                    );
                }
                None => {
                    // Unparseable file: treated as absent, cache dropped.
                    self.cache.remove(id);
                    return None;
                }
            }
        }

        self.cache.get(id).map(|c| c.value.clone())
    }

    fn read_record(&self, path: &Path) -> Option<T> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read record");
                return None;
            }
        };
        match serde_yaml::from_str(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse record, treating as absent");
                None
            }
        }
    }

    /// Stage a record. Nothing hits disk until `save`.
    pub fn set(&mut self, id: &str, value: T) {
        let mtime = self.cache.get(id).and_then(|c| c.mtime);
        self.cache.insert(id.to_string(), Cached { value, mtime });
        self.dirty.insert(id.to_string());
        self.deleted.remove(id);
    }

    /// Tombstone a record: gone from memory now, from disk at `save`.
    pub fn delete(&mut self, id: &str) {
        self.cache.remove(id);
        self.dirty.remove(id);
        self.deleted.insert(id.to_string());
    }

    /// Ids present on disk. Always a directory scan, never the cache; may
    /// include ids that have not been loaded yet.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let path = e.path();
                    if path.extension().and_then(|x| x.to_str()) == Some(self.extension) {
                        path.file_stem().and_then(|s| s.to_str()).map(String::from)
                    } else {
                        None
                    }
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        });
        ids
    }

    pub fn get_all(&mut self) -> Vec<(String, T)> {
        self.list()
            .into_iter()
            .filter_map(|id| self.get(&id).map(|v| (id, v)))
            .collect()
    }

    /// Drop every clean cache entry and re-read the directory.
    pub fn load_all(&mut self) {
        let dirty = self.dirty.clone();
        self.cache.retain(|id, _| dirty.contains(id));
        for id in self.list() {
            let _ = self.get(&id);
        }
    }

    /// Flush: unlink tombstones, serialize dirty records through the
    /// path-creating writer, clear both sets. A clean collection writes
    /// nothing and touches no mtimes.
    pub fn save(&mut self) -> Result<()> {
        let tombstones: Vec<String> = self.deleted.iter().cloned().collect();
        for id in tombstones {
            let path = self.record_path(&id);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to delete {}", path.display()));
                }
            }
            self.deleted.remove(&id);
        }

        let mut pending: Vec<String> = self.dirty.iter().cloned().collect();
        pending.sort();
        for id in pending {
            let Some(cached) = self.cache.get(&id) else {
                self.dirty.remove(&id);
                continue;
            };
            let text = serde_yaml::to_string(&cached.value)
                .with_context(|| format!("failed to serialize record {id}"))?;
            let path = self.record_path(&id);
            write_creating_dirs(&path, &text)?;
            let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
            if let Some(entry) = self.cache.get_mut(&id) {
                entry.mtime = mtime;
            }
            self.dirty.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Rec {
        n: u32,
        label: String,
    }

    fn rec(n: u32, label: &str) -> Rec {
        Rec {
            n,
            label: label.to_string(),
        }
    }

    #[test]
    fn set_is_invisible_on_disk_until_save() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());

        col.set("1", rec(1, "a"));
        assert!(col.list().is_empty());
        assert_eq!(col.get("1"), Some(rec(1, "a")));

        col.save().unwrap();
        assert_eq!(col.list(), vec!["1".to_string()]);
    }

    #[test]
    fn external_rewrite_with_newer_mtime_is_observed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        col.set("7", rec(1, "old"));
        col.save().unwrap();
        assert_eq!(col.get("7").unwrap().label, "old");

        // Simulate the peer process rewriting the record with a later mtime.
        let path = tmp.path().join("7.yml");
        std::fs::write(&path, serde_yaml::to_string(&rec(2, "new")).unwrap()).unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(later).unwrap();

        assert_eq!(col.get("7").unwrap().label, "new");
    }

    #[test]
    fn delete_takes_effect_in_memory_then_on_save() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        col.set("3", rec(3, "x"));
        col.save().unwrap();

        col.delete("3");
        assert_eq!(col.get("3"), None);
        assert_eq!(col.list(), vec!["3".to_string()]);

        col.save().unwrap();
        assert!(col.list().is_empty());
    }

    #[test]
    fn save_is_idempotent_when_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        col.set("5", rec(5, "v"));
        col.save().unwrap();

        let path = tmp.path().join("5.yml");
        let first = std::fs::metadata(&path).unwrap().modified().unwrap();
        col.save().unwrap();
        let second = std::fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parse_error_reads_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("9.yml"), ": not yaml [").unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        assert_eq!(col.get("9"), None);
        // still listed: the scan is authoritative for existence
        assert_eq!(col.list(), vec!["9".to_string()]);
    }

    #[test]
    fn list_orders_numeric_ids_numerically() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        for id in ["10", "2", "1"] {
            col.set(id, rec(0, id));
        }
        col.save().unwrap();
        assert_eq!(col.list(), vec!["1", "2", "10"]);
    }

    #[test]
    fn get_all_skips_unparseable_records() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        col.set("1", rec(1, "a"));
        col.set("2", rec(2, "b"));
        col.save().unwrap();
        std::fs::write(tmp.path().join("3.yml"), ": broken [").unwrap();

        let all = col.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "1");
    }

    #[test]
    fn load_all_refreshes_clean_entries_but_keeps_staged_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        col.set("1", rec(1, "disk"));
        col.save().unwrap();
        col.set("2", rec(2, "staged"));

        // peer rewrites record 1 behind our back
        std::fs::write(
            tmp.path().join("1.yml"),
            serde_yaml::to_string(&rec(9, "rewritten")).unwrap(),
        )
        .unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(tmp.path().join("1.yml"))
            .unwrap()
            .set_modified(later)
            .unwrap();

        col.load_all();
        assert_eq!(col.get("1").unwrap().label, "rewritten");
        assert_eq!(col.get("2").unwrap().label, "staged");
    }

    #[test]
    fn custom_extension_scans_matching_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("echo.yaml"),
            serde_yaml::to_string(&rec(1, "t")).unwrap(),
        )
        .unwrap();
        std::fs::write(tmp.path().join("stray.yml"), "n: 1\nlabel: x\n").unwrap();

        let col: Collection<Rec> = Collection::with_extension(tmp.path(), "yaml");
        assert_eq!(col.list(), vec!["echo".to_string()]);
    }

    #[test]
    fn dirty_record_wins_over_stale_disk_check() {
        let tmp = tempfile::tempdir().unwrap();
        let mut col: Collection<Rec> = Collection::new(tmp.path());
        col.set("4", rec(4, "a"));
        col.save().unwrap();
        col.set("4", rec(4, "staged"));
        assert_eq!(col.get("4").unwrap().label, "staged");
    }
}
