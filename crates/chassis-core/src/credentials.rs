//! Pluggable credential storage for secure profile fields.
//!
//! Handlers never see the backend directly; the profile manager materializes
//! secure fields through the [`CredentialManager`], which wraps whichever
//! [`CredentialBackend`] the host supplied at initialization. The default
//! [`Base64Backend`] persists base64-wrapped entries as TOML with 0600
//! permissions -- an inert passthrough, not a functional secret store.
//! Hosts wanting real protection plug in an OS keystore implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use chassis_types::ChassisError;

/// Capability set a credential backend provides.
///
/// Credentials at this boundary are opaque strings keyed by account. One
/// implementation is active per process; the host names it at
/// initialization and the framework calls [`CredentialBackend::initialize`]
/// exactly once before first use.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// One-time setup before first use. The default is a no-op.
    async fn initialize(&self) -> Result<(), ChassisError> {
        Ok(())
    }

    /// Retrieve the secret stored under an account, if any.
    async fn load(&self, account: &str) -> Result<Option<String>, ChassisError>;

    /// Store a secret under an account, replacing any prior value.
    async fn save(&self, account: &str, secret: &str) -> Result<(), ChassisError>;

    /// Remove the secret stored under an account.
    async fn delete(&self, account: &str) -> Result<(), ChassisError>;
}

/// Front door to the active credential backend.
///
/// Enforces the initialize-once contract, rejects empty secrets on save,
/// and is the only path the rest of the framework uses to reach the
/// backend.
pub struct CredentialManager {
    backend: Box<dyn CredentialBackend>,
    init: OnceCell<()>,
}

impl CredentialManager {
    /// Wrap the host-supplied backend.
    pub fn new(backend: Box<dyn CredentialBackend>) -> Self {
        Self {
            backend,
            init: OnceCell::new(),
        }
    }

    async fn ready(&self) -> Result<(), ChassisError> {
        self.init
            .get_or_try_init(|| async {
                tracing::debug!("initializing credential backend");
                self.backend.initialize().await
            })
            .await?;
        Ok(())
    }

    /// Retrieve the secret stored under an account, if any.
    pub async fn load(&self, account: &str) -> Result<Option<String>, ChassisError> {
        self.ready().await?;
        self.backend.load(account).await
    }

    /// Store a secret under an account.
    ///
    /// Empty or whitespace-only secrets are rejected: a blank value here is
    /// always a caller bug, and storing it would silently break later
    /// profile loads.
    pub async fn save(&self, account: &str, secret: &str) -> Result<(), ChassisError> {
        if secret.trim().is_empty() {
            return Err(ChassisError::MissingSecureField(account.to_string()));
        }
        self.ready().await?;
        self.backend.save(account, secret).await
    }

    /// Remove the secret stored under an account.
    pub async fn delete(&self, account: &str) -> Result<(), ChassisError> {
        self.ready().await?;
        self.backend.delete(account).await
    }
}

/// On-disk document for the default backend.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    /// Account key -> base64-wrapped secret.
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// The default credential backend: base64-wrapped secrets in a TOML file.
///
/// The wrapping is symmetric encoding, not encryption; it exists so raw
/// secrets never sit in the file verbatim, while keeping the backend free
/// of platform dependencies.
pub struct Base64Backend {
    path: PathBuf,
}

impl Base64Backend {
    /// Create a backend persisting to the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_file(&self) -> Result<CredentialFile, ChassisError> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ChassisError::Credential(format!("failed to read {}: {e}", self.path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            ChassisError::Credential(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    fn write_file(&self, file: &CredentialFile) -> Result<(), ChassisError> {
        let parent = self.path.parent().ok_or_else(|| {
            ChassisError::Credential(format!("invalid store path {}", self.path.display()))
        })?;
        std::fs::create_dir_all(parent).map_err(|e| {
            ChassisError::Credential(format!("failed to create {}: {e}", parent.display()))
        })?;

        let doc = toml::to_string_pretty(file)
            .map_err(|e| ChassisError::Credential(format!("failed to serialize store: {e}")))?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, doc).map_err(|e| {
            ChassisError::Credential(format!("failed to write {}: {e}", tmp.display()))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            ChassisError::Credential(format!(
                "failed to move {} to {}: {e}",
                tmp.display(),
                self.path.display()
            ))
        })?;
        lock_file_permissions(&self.path)
    }
}

#[async_trait]
impl CredentialBackend for Base64Backend {
    async fn initialize(&self) -> Result<(), ChassisError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChassisError::Credential(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Option<String>, ChassisError> {
        let file = self.read_file()?;
        let Some(wrapped) = file.entries.get(account) else {
            return Ok(None);
        };
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(wrapped)
            .map_err(|e| {
                ChassisError::Credential(format!("corrupt entry for account {account}: {e}"))
            })?;
        let secret = String::from_utf8(bytes).map_err(|e| {
            ChassisError::Credential(format!("corrupt entry for account {account}: {e}"))
        })?;
        Ok(Some(secret))
    }

    async fn save(&self, account: &str, secret: &str) -> Result<(), ChassisError> {
        let mut file = self.read_file()?;
        let wrapped = base64::engine::general_purpose::STANDARD.encode(secret.as_bytes());
        file.entries.insert(account.to_string(), wrapped);
        self.write_file(&file)
    }

    async fn delete(&self, account: &str) -> Result<(), ChassisError> {
        let mut file = self.read_file()?;
        if file.entries.remove(account).is_none() {
            tracing::debug!(account, "delete of unknown credential account");
            return Ok(());
        }
        self.write_file(&file)
    }
}

fn lock_file_permissions(path: &Path) -> Result<(), ChassisError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms).map_err(|e| {
            ChassisError::Credential(format!(
                "failed to secure permissions on {}: {e}",
                path.display()
            ))
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// In-memory backend for tests and embedders that manage secrets elsewhere.
#[derive(Default)]
pub struct MemoryCredentialBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryCredentialBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an account, bypassing the manager's empty-secret check.
    pub fn preload(self, account: impl Into<String>, secret: impl Into<String>) -> Self {
        self.entries
            .lock()
            .expect("credential map lock")
            .insert(account.into(), secret.into());
        self
    }
}

#[async_trait]
impl CredentialBackend for MemoryCredentialBackend {
    async fn load(&self, account: &str) -> Result<Option<String>, ChassisError> {
        Ok(self
            .entries
            .lock()
            .expect("credential map lock")
            .get(account)
            .cloned())
    }

    async fn save(&self, account: &str, secret: &str) -> Result<(), ChassisError> {
        self.entries
            .lock()
            .expect("credential map lock")
            .insert(account.to_string(), secret.to_string());
        Ok(())
    }

    async fn delete(&self, account: &str) -> Result<(), ChassisError> {
        self.entries
            .lock()
            .expect("credential map lock")
            .remove(account);
        Ok(())
    }
}

/// Mask a secret for display: first 4 characters then `***`.
pub fn mask_secret(value: &str) -> String {
    if value.len() < 4 {
        "***".to_string()
    } else {
        let prefix: String = value.chars().take(4).collect();
        format!("{prefix}***")
    }
}
