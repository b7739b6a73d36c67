//! facecheck-store: flat-file persistence for face records.
//!
//! The store is a directory with two subdirectories: `descriptors/` holds one
//! JSON record per registration and `photos/` holds the paired image, both
//! named by the record id. There is no cache and no index; every read
//! operation re-scans the directory. File I/O is synchronous and unguarded:
//! concurrent create/delete against one id is last-writer-wins, and a reader
//! mid-scan may see a partially-written file. Listing tolerates that by
//! skipping unreadable entries.

use chrono::Local;
use facecheck_core::{Descriptor, FaceRecord};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DESCRIPTORS_DIR: &str = "descriptors";
const PHOTOS_DIR: &str = "photos";
const RECORD_EXT: &str = "json";
const PHOTO_EXT: &str = "jpg";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Directory-backed store of (name, descriptor, timestamp, photo) records.
pub struct RecordStore {
    descriptors_dir: PathBuf,
    photos_dir: PathBuf,
}

impl RecordStore {
    /// Open (and create if necessary) the store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let descriptors_dir = root.join(DESCRIPTORS_DIR);
        let photos_dir = root.join(PHOTOS_DIR);
        fs::create_dir_all(&descriptors_dir)?;
        fs::create_dir_all(&photos_dir)?;

        tracing::info!(root = %root.display(), "record store opened");

        Ok(Self { descriptors_dir, photos_dir })
    }

    /// Persist a new record and its photo, returning the generated record id.
    ///
    /// The id is `<slug(name)>_<timestamp>` at second granularity; collisions
    /// are only possible within the same second and are not guarded against.
    pub fn create(
        &self,
        name: &str,
        descriptor: Descriptor,
        photo_bytes: &[u8],
    ) -> Result<String, StoreError> {
        let timestamp = Local::now();
        let id = format!("{}_{}", slugify(name), timestamp.format("%Y%m%d_%H%M%S"));

        let record = FaceRecord {
            id: id.clone(),
            name: name.to_string(),
            descriptor,
            registered_at: timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        let json = serde_json::to_vec_pretty(&record)?;
        fs::write(self.descriptor_path(&id), json)?;
        fs::write(self.photo_path(&id), photo_bytes)?;

        tracing::info!(id = %id, name = %name, "record created");
        Ok(id)
    }

    /// Load every record by scanning the descriptor directory.
    ///
    /// A corrupt or unreadable file is skipped with a warning; the rest of
    /// the listing still succeeds.
    pub fn list(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.descriptors_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }

            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable record");
                }
            }
        }

        Ok(records)
    }

    /// Delete a record by id.
    ///
    /// Returns `false` when the descriptor file does not exist. The paired
    /// photo is removed best-effort; a missing photo is not an error.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let descriptor = self.descriptor_path(id);
        if !descriptor.exists() {
            tracing::warn!(id = %id, "delete: record not found");
            return Ok(false);
        }
        fs::remove_file(&descriptor)?;

        if let Err(err) = fs::remove_file(self.photo_path(id)) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(id = %id, error = %err, "could not remove paired photo");
            }
        }

        tracing::info!(id = %id, "record deleted");
        Ok(true)
    }

    /// Path of the photo paired with a record id.
    pub fn photo_path(&self, id: &str) -> PathBuf {
        self.photos_dir.join(format!("{id}.{PHOTO_EXT}"))
    }

    fn descriptor_path(&self, id: &str) -> PathBuf {
        self.descriptors_dir.join(format!("{id}.{RECORD_EXT}"))
    }
}

fn read_record(path: &Path) -> Result<FaceRecord, StoreError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Normalise a display name into a filename-safe slug: lowercase, whitespace
/// collapsed to underscores, restricted to `[a-z0-9_-]`. An empty result
/// falls back to "user" so the id always has a non-empty prefix.
fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();

    if slug.is_empty() {
        "user".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(values: Vec<f32>) -> Descriptor {
        Descriptor { values, model_version: Some("w600k_r50".into()) }
    }

    fn store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Ana Silva"), "ana_silva");
        assert_eq!(slugify("  João  "), "joo");
        assert_eq!(slugify("x-1_2"), "x-1_2");
        assert_eq!(slugify("!!!"), "user");
        assert_eq!(slugify(""), "user");
    }

    #[test]
    fn test_create_writes_descriptor_and_photo() {
        let (dir, store) = store();
        let id = store.create("Ana", descriptor(vec![0.1, 0.2]), b"jpegbytes").unwrap();

        assert!(id.starts_with("ana_"));
        assert!(dir.path().join("descriptors").join(format!("{id}.json")).exists());
        assert!(store.photo_path(&id).exists());
        assert_eq!(fs::read(store.photo_path(&id)).unwrap(), b"jpegbytes");
    }

    #[test]
    fn test_list_returns_all_created() {
        let (_dir, store) = store();
        store.create("Ana", descriptor(vec![0.1]), b"a").unwrap();
        store.create("Bob", descriptor(vec![0.2]), b"b").unwrap();
        store.create("Ana", descriptor(vec![0.3]), b"c").unwrap();

        let mut names: Vec<String> = store.list().unwrap().into_iter().map(|r| r.name).collect();
        names.sort();
        assert_eq!(names, vec!["Ana", "Ana", "Bob"]);
    }

    #[test]
    fn test_duplicate_registrations_are_independent() {
        // Same person twice: two records, both present. Ids differ as long as
        // the timestamps differ; force distinct ids via distinct names here
        // since creation within one second would collide by design.
        let (_dir, store) = store();
        let a = store.create("Ana", descriptor(vec![0.1]), b"a").unwrap();
        let b = store.create("Ana B", descriptor(vec![0.1]), b"b").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_record_skipped() {
        let (dir, store) = store();
        store.create("Ana", descriptor(vec![0.1]), b"a").unwrap();
        fs::write(dir.path().join("descriptors/broken.json"), b"not json").unwrap();
        fs::write(dir.path().join("descriptors/notes.txt"), b"ignored").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Ana");
    }

    #[test]
    fn test_delete_removes_both_files() {
        let (dir, store) = store();
        let id = store.create("Ana", descriptor(vec![0.1]), b"a").unwrap();

        assert!(store.delete(&id).unwrap());
        assert!(!dir.path().join("descriptors").join(format!("{id}.json")).exists());
        assert!(!store.photo_path(&id).exists());
    }

    #[test]
    fn test_delete_unknown_returns_false() {
        let (_dir, store) = store();
        assert!(!store.delete("nobody_20260101_000000").unwrap());
    }

    #[test]
    fn test_delete_with_missing_photo_still_succeeds() {
        let (_dir, store) = store();
        let id = store.create("Ana", descriptor(vec![0.1]), b"a").unwrap();
        fs::remove_file(store.photo_path(&id)).unwrap();

        assert!(store.delete(&id).unwrap());
    }

    #[test]
    fn test_list_roundtrips_descriptor_values() {
        let (_dir, store) = store();
        let values = vec![0.25f32, -0.5, 0.75];
        store.create("Ana", descriptor(values.clone()), b"a").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records[0].descriptor.values, values);
        assert_eq!(records[0].descriptor.model_version.as_deref(), Some("w600k_r50"));
    }
}
