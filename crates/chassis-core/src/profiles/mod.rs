//! Profile loading and dependency resolution.
//!
//! The processor opens one [`ProfileSession`] per invocation; every load in
//! that session is memoized by `type:name`, dependencies resolve depth-first
//! with cycle detection, and secure fields are materialized through the
//! credential manager. The session drains into the read-only [`ProfileMap`]
//! handlers receive.

mod store;

pub use store::{FileProfileStore, MemoryProfileStore, ProfileStore};

use std::collections::BTreeMap;
use std::sync::Arc;

use chassis_types::{
    credential_account, FailureSubkind, PreparationError, Profile, ProfileRef,
};

use crate::credentials::CredentialManager;

/// The per-invocation, read-only view of resolved profiles.
///
/// The first profile loaded for a type is its primary: that is what
/// [`ProfileMap::get`] returns. Transitively-loaded dependencies of the same
/// type follow in load order.
#[derive(Debug, Clone, Default)]
pub struct ProfileMap {
    by_type: BTreeMap<String, Vec<Profile>>,
}

impl ProfileMap {
    /// The primary profile of a type.
    pub fn get(&self, profile_type: &str) -> Option<&Profile> {
        self.by_type.get(profile_type).and_then(|v| v.first())
    }

    /// All loaded profiles of a type, primary first.
    pub fn get_all(&self, profile_type: &str) -> &[Profile] {
        self.by_type
            .get(profile_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A specific profile by type and name.
    pub fn get_named(&self, profile_type: &str, name: &str) -> Option<&Profile> {
        self.by_type
            .get(profile_type)?
            .iter()
            .find(|p| p.name == name)
    }

    /// Number of distinct profiles held.
    pub fn len(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    /// Whether no profiles were loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, profile: Profile, primary: bool) {
        let entry = self.by_type.entry(profile.profile_type.clone()).or_default();
        if primary {
            entry.insert(0, profile);
        } else {
            entry.push(profile);
        }
    }
}

/// Yields per-type managers and per-invocation sessions over one store and
/// credential manager pair.
#[derive(Clone)]
pub struct ProfileManagerFactory {
    store: Arc<dyn ProfileStore>,
    credentials: Arc<CredentialManager>,
}

impl ProfileManagerFactory {
    /// Create a factory over a store and the active credential manager.
    pub fn new(store: Arc<dyn ProfileStore>, credentials: Arc<CredentialManager>) -> Self {
        Self { store, credentials }
    }

    /// A manager scoped to one profile type.
    pub fn manager_for(&self, profile_type: impl Into<String>) -> ProfileManager {
        ProfileManager {
            profile_type: profile_type.into(),
            factory: self.clone(),
        }
    }

    /// A fresh memoizing session for one invocation.
    pub fn session(&self) -> ProfileSession {
        ProfileSession {
            store: Arc::clone(&self.store),
            credentials: Arc::clone(&self.credentials),
            loaded: BTreeMap::new(),
            map: ProfileMap::default(),
        }
    }
}

/// Loads profiles of a single type. Each call opens a fresh session; use
/// [`ProfileManagerFactory::session`] directly to share memoization across
/// types within one invocation, as the processor does.
pub struct ProfileManager {
    profile_type: String,
    factory: ProfileManagerFactory,
}

impl ProfileManager {
    /// Load a named profile of this type with its dependencies.
    pub async fn load(&self, name: &str) -> Result<Profile, PreparationError> {
        let mut session = self.factory.session();
        session.load(&self.profile_type, name).await
    }

    /// Load the default profile of this type with its dependencies.
    pub async fn load_default(&self) -> Result<Profile, PreparationError> {
        let mut session = self.factory.session();
        session.load_default(&self.profile_type).await
    }

    /// Load every profile of this type, sorted by name.
    pub async fn load_all(&self) -> Result<Vec<Profile>, PreparationError> {
        let mut session = self.factory.session();
        let names = session.list(&self.profile_type).await?;
        let mut profiles = Vec::with_capacity(names.len());
        for name in names {
            profiles.push(session.load(&self.profile_type, &name).await?);
        }
        Ok(profiles)
    }
}

/// One invocation's worth of profile loading: memoized, cycle-checked,
/// secure-field-materializing.
pub struct ProfileSession {
    store: Arc<dyn ProfileStore>,
    credentials: Arc<CredentialManager>,
    loaded: BTreeMap<String, Profile>,
    map: ProfileMap,
}

impl ProfileSession {
    /// Load a named profile and its dependency closure. The returned profile
    /// (and everything it pulled in) is also recorded in the session map.
    pub async fn load(
        &mut self,
        profile_type: &str,
        name: &str,
    ) -> Result<Profile, PreparationError> {
        let root = ProfileRef::new(profile_type, name);
        let mut stack = Vec::new();
        self.resolve(&root, &mut stack, true).await
    }

    /// Load the default profile of a type: the type configuration's
    /// designated default when present, else the profile named `default`.
    pub async fn load_default(&mut self, profile_type: &str) -> Result<Profile, PreparationError> {
        let name = self
            .store
            .type_config(profile_type)
            .and_then(|c| c.default_name)
            .unwrap_or_else(|| "default".to_string());
        self.load(profile_type, &name).await.map_err(|e| {
            if e.subkind == FailureSubkind::ProfileMissing {
                PreparationError::new(
                    FailureSubkind::ProfileMissing,
                    format!("no default profile for type '{profile_type}'"),
                )
                .with_details(format!("looked for {profile_type}:{name}"))
            } else {
                e
            }
        })
    }

    /// Profile names available for a type.
    pub async fn list(&mut self, profile_type: &str) -> Result<Vec<String>, PreparationError> {
        self.store.list(profile_type).await.map_err(|e| {
            PreparationError::new(
                FailureSubkind::ProfileMissing,
                format!("cannot list profiles of type '{profile_type}'"),
            )
            .with_details(e.to_string())
        })
    }

    /// Drain the session into the map handed to handlers.
    pub fn into_map(self) -> ProfileMap {
        self.map
    }

    fn resolve<'a>(
        &'a mut self,
        reference: &'a ProfileRef,
        stack: &'a mut Vec<ProfileRef>,
        primary: bool,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Profile, PreparationError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let key = reference.to_string();

            if let Some(profile) = self.loaded.get(&key) {
                return Ok(profile.clone());
            }

            if stack.contains(reference) {
                let mut path: Vec<String> = stack.iter().map(ProfileRef::to_string).collect();
                path.push(key);
                return Err(PreparationError::new(
                    FailureSubkind::ProfileCycle,
                    format!("profile dependencies of {reference} form a cycle"),
                )
                .with_details(path.join(" -> ")));
            }
            stack.push(reference.clone());

            let result = self.resolve_inner(reference, stack, primary).await;
            stack.pop();
            result
        })
    }

    async fn resolve_inner(
        &mut self,
        reference: &ProfileRef,
        stack: &mut Vec<ProfileRef>,
        primary: bool,
    ) -> Result<Profile, PreparationError> {
        let mut profile = self
            .store
            .read(&reference.profile_type, &reference.name)
            .await
            .map_err(|e| {
                PreparationError::new(
                    FailureSubkind::ProfileMissing,
                    format!("failed to load profile {reference}"),
                )
                .with_details(e.to_string())
            })?
            .ok_or_else(|| {
                PreparationError::new(
                    FailureSubkind::ProfileMissing,
                    format!(
                        "profile '{}' of type '{}' does not exist",
                        reference.name, reference.profile_type
                    ),
                )
            })?;

        // Dependencies load before the profile that needs them.
        for dependency in profile.dependencies.clone() {
            if let Err(cause) = self.resolve(&dependency, stack, false).await {
                // Cycles surface as themselves; everything else wraps.
                if cause.subkind == FailureSubkind::ProfileCycle {
                    return Err(cause);
                }
                return Err(PreparationError::new(
                    FailureSubkind::DependencyFailed,
                    format!("failed to load dependency {dependency} of {reference}"),
                )
                .with_cause(cause.into_record()));
            }
        }

        self.materialize_secure_fields(&mut profile).await?;

        tracing::debug!(profile = %reference, "profile resolved");
        self.loaded.insert(reference.to_string(), profile.clone());
        self.map.insert(profile.clone(), primary);
        Ok(profile)
    }

    /// Pull secure field values out of the credential backend.
    ///
    /// Fields the profile document lists as secure are required: a miss is a
    /// CredentialMissing failure. Fields the type configuration marks secure
    /// but the document does not list materialize best-effort -- the profile
    /// simply never stored one.
    async fn materialize_secure_fields(
        &mut self,
        profile: &mut Profile,
    ) -> Result<(), PreparationError> {
        for field in profile.secure_fields.clone() {
            let account = credential_account(&profile.profile_type, &profile.name, &field);
            let secret = self.load_secret(profile, &field, &account).await?;
            let Some(secret) = secret else {
                return Err(PreparationError::new(
                    FailureSubkind::CredentialMissing,
                    format!(
                        "secure field '{field}' of profile {} is not stored",
                        profile.reference()
                    ),
                )
                .with_details(account));
            };
            profile
                .fields
                .insert(field, serde_json::Value::String(secret));
        }

        let type_secure = self
            .store
            .type_config(&profile.profile_type)
            .map(|c| c.secure_fields)
            .unwrap_or_default();
        for field in type_secure {
            if profile.secure_fields.contains(&field) || profile.fields.contains_key(&field) {
                continue;
            }
            let account = credential_account(&profile.profile_type, &profile.name, &field);
            if let Some(secret) = self.load_secret(profile, &field, &account).await? {
                profile
                    .fields
                    .insert(field, serde_json::Value::String(secret));
            }
        }
        Ok(())
    }

    async fn load_secret(
        &self,
        profile: &Profile,
        field: &str,
        account: &str,
    ) -> Result<Option<String>, PreparationError> {
        self.credentials.load(account).await.map_err(|e| {
            PreparationError::new(
                FailureSubkind::CredentialMissing,
                format!(
                    "secure field '{field}' of profile {} could not be retrieved",
                    profile.reference()
                ),
            )
            .with_details(e.to_string())
        })
    }
}
