//! Profile persistence.
//!
//! The store only reads and writes whole profiles; dependency resolution and
//! secure-field materialization live in the manager. The file store lays
//! profiles out as `<root>/profiles/<type>/<name>.toml`; an in-memory store
//! backs tests and embedders.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use chassis_types::{ChassisError, Profile, ProfileTypeConfig};

/// Maximum profile document size in bytes. Larger files are rejected to
/// keep a corrupted or hostile store from exhausting memory.
const MAX_PROFILE_FILE_SIZE: u64 = 1024 * 1024; // 1 MB

/// Read/write access to persisted profiles plus per-type configuration.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read one profile, or `None` when it does not exist.
    async fn read(&self, profile_type: &str, name: &str)
        -> Result<Option<Profile>, ChassisError>;

    /// List the profile names of a type, sorted.
    async fn list(&self, profile_type: &str) -> Result<Vec<String>, ChassisError>;

    /// Persist a profile, replacing any prior document.
    async fn write(&self, profile: &Profile) -> Result<(), ChassisError>;

    /// Remove a profile. Removing a missing profile is a no-op.
    async fn delete(&self, profile_type: &str, name: &str) -> Result<(), ChassisError>;

    /// The registered configuration for a profile type, if any.
    fn type_config(&self, profile_type: &str) -> Option<ProfileTypeConfig>;
}

/// TOML-file-backed store rooted at a directory.
pub struct FileProfileStore {
    root: PathBuf,
    types: BTreeMap<String, ProfileTypeConfig>,
}

impl FileProfileStore {
    /// Create a store rooted at `root`; profiles live under
    /// `<root>/profiles/<type>/<name>.toml`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            types: BTreeMap::new(),
        }
    }

    /// Register a profile type configuration.
    #[must_use]
    pub fn with_type(mut self, config: ProfileTypeConfig) -> Self {
        self.types.insert(config.profile_type.clone(), config);
        self
    }

    fn type_dir(&self, profile_type: &str) -> PathBuf {
        self.root.join("profiles").join(profile_type)
    }

    fn profile_path(&self, profile_type: &str, name: &str) -> PathBuf {
        self.type_dir(profile_type).join(format!("{name}.toml"))
    }
}

/// Read a profile document with hygiene checks: size cap, no null bytes.
fn read_profile_file(path: &std::path::Path) -> Result<String, ChassisError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        ChassisError::ProfileStore(format!("cannot read {}: {e}", path.display()))
    })?;
    if metadata.len() > MAX_PROFILE_FILE_SIZE {
        return Err(ChassisError::ProfileStore(format!(
            "{} exceeds maximum size of {MAX_PROFILE_FILE_SIZE} bytes (actual: {} bytes)",
            path.display(),
            metadata.len()
        )));
    }
    let content = std::fs::read_to_string(path).map_err(|e| {
        ChassisError::ProfileStore(format!("cannot read {}: {e}", path.display()))
    })?;
    if content.contains('\0') {
        return Err(ChassisError::ProfileStore(format!(
            "{} contains null bytes",
            path.display()
        )));
    }
    Ok(content)
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn read(
        &self,
        profile_type: &str,
        name: &str,
    ) -> Result<Option<Profile>, ChassisError> {
        let path = self.profile_path(profile_type, name);
        if !path.exists() {
            return Ok(None);
        }
        let content = read_profile_file(&path)?;
        let profile: Profile = toml::from_str(&content).map_err(|e| {
            ChassisError::ProfileStore(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(profile))
    }

    async fn list(&self, profile_type: &str) -> Result<Vec<String>, ChassisError> {
        let dir = self.type_dir(profile_type);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            ChassisError::ProfileStore(format!("cannot list {}: {e}", dir.display()))
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ChassisError::ProfileStore(format!("cannot list {}: {e}", dir.display()))
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn write(&self, profile: &Profile) -> Result<(), ChassisError> {
        let dir = self.type_dir(&profile.profile_type);
        std::fs::create_dir_all(&dir).map_err(|e| {
            ChassisError::ProfileStore(format!("failed to create {}: {e}", dir.display()))
        })?;

        let doc = toml::to_string_pretty(profile).map_err(|e| {
            ChassisError::ProfileStore(format!(
                "failed to serialize profile {}: {e}",
                profile.reference()
            ))
        })?;
        let path = self.profile_path(&profile.profile_type, &profile.name);
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, doc).map_err(|e| {
            ChassisError::ProfileStore(format!("failed to write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            ChassisError::ProfileStore(format!(
                "failed to move {} to {}: {e}",
                tmp.display(),
                path.display()
            ))
        })?;
        Ok(())
    }

    async fn delete(&self, profile_type: &str, name: &str) -> Result<(), ChassisError> {
        let path = self.profile_path(profile_type, name);
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_file(&path).map_err(|e| {
            ChassisError::ProfileStore(format!("failed to remove {}: {e}", path.display()))
        })
    }

    fn type_config(&self, profile_type: &str) -> Option<ProfileTypeConfig> {
        self.types.get(profile_type).cloned()
    }
}

/// In-memory store for tests and embedders.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<BTreeMap<(String, String), Profile>>,
    types: BTreeMap<String, ProfileTypeConfig>,
}

impl MemoryProfileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a profile type configuration.
    #[must_use]
    pub fn with_type(mut self, config: ProfileTypeConfig) -> Self {
        self.types.insert(config.profile_type.clone(), config);
        self
    }

    /// Seed a profile.
    #[must_use]
    pub fn with_profile(self, profile: Profile) -> Self {
        self.profiles
            .lock()
            .expect("profile map lock")
            .insert((profile.profile_type.clone(), profile.name.clone()), profile);
        self
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn read(
        &self,
        profile_type: &str,
        name: &str,
    ) -> Result<Option<Profile>, ChassisError> {
        Ok(self
            .profiles
            .lock()
            .expect("profile map lock")
            .get(&(profile_type.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(&self, profile_type: &str) -> Result<Vec<String>, ChassisError> {
        let profiles = self.profiles.lock().expect("profile map lock");
        Ok(profiles
            .keys()
            .filter(|(t, _)| t == profile_type)
            .map(|(_, n)| n.clone())
            .collect())
    }

    async fn write(&self, profile: &Profile) -> Result<(), ChassisError> {
        self.profiles.lock().expect("profile map lock").insert(
            (profile.profile_type.clone(), profile.name.clone()),
            profile.clone(),
        );
        Ok(())
    }

    async fn delete(&self, profile_type: &str, name: &str) -> Result<(), ChassisError> {
        self.profiles
            .lock()
            .expect("profile map lock")
            .remove(&(profile_type.to_string(), name.to_string()));
        Ok(())
    }

    fn type_config(&self, profile_type: &str) -> Option<ProfileTypeConfig> {
        self.types.get(profile_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        let profile = Profile::new("main", "m1")
            .with_field("host", serde_json::json!("example.com"))
            .with_dependency("dep", "d1");
        store.write(&profile).await.unwrap();

        let loaded = store.read("main", "m1").await.unwrap().unwrap();
        assert_eq!(loaded, profile);
        assert!(dir
            .path()
            .join("profiles")
            .join("main")
            .join("m1.toml")
            .exists());
    }

    #[tokio::test]
    async fn file_store_read_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        assert!(store.read("main", "absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_lists_sorted_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        store.write(&Profile::new("main", "beta")).await.unwrap();
        store.write(&Profile::new("main", "alpha")).await.unwrap();
        store.write(&Profile::new("dep", "other")).await.unwrap();

        let names = store.list("main").await.unwrap();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
        assert!(store.list("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        store.write(&Profile::new("main", "m1")).await.unwrap();
        store.delete("main", "m1").await.unwrap();
        store.delete("main", "m1").await.unwrap();
        assert!(store.read("main", "m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_rejects_oversized_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        let type_dir = dir.path().join("profiles").join("main");
        std::fs::create_dir_all(&type_dir).unwrap();
        let big = vec![b'#'; (MAX_PROFILE_FILE_SIZE + 1) as usize];
        std::fs::write(type_dir.join("big.toml"), big).unwrap();

        let err = store.read("main", "big").await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size"));
    }

    #[tokio::test]
    async fn file_store_rejects_null_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        let type_dir = dir.path().join("profiles").join("main");
        std::fs::create_dir_all(&type_dir).unwrap();
        std::fs::write(type_dir.join("bad.toml"), b"name = \"bad\"\0").unwrap();

        let err = store.read("main", "bad").await.unwrap_err();
        assert!(err.to_string().contains("null bytes"));
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryProfileStore::new()
            .with_profile(Profile::new("main", "m1").with_field("k", serde_json::json!(1)));
        let loaded = store.read("main", "m1").await.unwrap().unwrap();
        assert_eq!(loaded.field("k"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn type_config_lookup() {
        let store = MemoryProfileStore::new()
            .with_type(ProfileTypeConfig::new("main").with_default("m1"));
        assert_eq!(
            store.type_config("main").unwrap().default_name.as_deref(),
            Some("m1")
        );
        assert!(store.type_config("dep").is_none());
    }
}
