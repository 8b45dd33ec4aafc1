//! Profile data model.
//!
//! A profile is a named, typed bundle of configuration consumed by command
//! handlers. Fields marked secure in the type configuration are never held
//! here in plaintext on disk; the credential manager stores them under a
//! stable account key and the profile manager materializes them at load
//! time.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Reference to a profile by type and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileRef {
    /// The profile type (e.g. "main", "dep").
    pub profile_type: String,
    /// The profile name within that type.
    pub name: String,
}

impl ProfileRef {
    /// Create a reference.
    pub fn new(profile_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            profile_type: profile_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ProfileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.profile_type, self.name)
    }
}

/// A named, typed configuration bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name, unique within its type.
    pub name: String,
    /// The profile type this bundle belongs to.
    pub profile_type: String,
    /// Configuration fields. Secure fields appear here only after the
    /// profile manager materializes them from the credential backend.
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Field names whose values live in the credential backend.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secure_fields: Vec<String>,
    /// Profiles this one depends on, loaded first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ProfileRef>,
}

impl Profile {
    /// Create an empty profile of the given type.
    pub fn new(profile_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profile_type: profile_type.into(),
            fields: BTreeMap::new(),
            secure_fields: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Set a field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Declare a field as secure (its value lives in the credential backend).
    #[must_use]
    pub fn with_secure_field(mut self, name: impl Into<String>) -> Self {
        self.secure_fields.push(name.into());
        self
    }

    /// Declare a dependency on another profile.
    #[must_use]
    pub fn with_dependency(
        mut self,
        profile_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.dependencies.push(ProfileRef::new(profile_type, name));
        self
    }

    /// Look up a field value.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Look up a field and borrow it as a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(serde_json::Value::as_str)
    }

    /// This profile's type:name reference.
    pub fn reference(&self) -> ProfileRef {
        ProfileRef::new(self.profile_type.clone(), self.name.clone())
    }
}

/// Per-type configuration the store holds about a profile type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileTypeConfig {
    /// The profile type this configuration describes.
    pub profile_type: String,
    /// Field names that must be routed through the credential backend when
    /// profiles of this type are saved.
    #[serde(default)]
    pub secure_fields: BTreeSet<String>,
    /// Name of the default profile for this type, when one is designated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_name: Option<String>,
}

impl ProfileTypeConfig {
    /// Create a type configuration with no secure fields.
    pub fn new(profile_type: impl Into<String>) -> Self {
        Self {
            profile_type: profile_type.into(),
            secure_fields: BTreeSet::new(),
            default_name: None,
        }
    }

    /// Declare a secure field for this type.
    #[must_use]
    pub fn with_secure_field(mut self, name: impl Into<String>) -> Self {
        self.secure_fields.insert(name.into());
        self
    }

    /// Designate the default profile name.
    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }
}

/// The credential account key for a secure profile field.
///
/// Stable across process invocations; replacement credential backends must
/// preserve this format.
pub fn credential_account(profile_type: &str, name: &str, field: &str) -> String {
    format!("{profile_type}_{name}_{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_key_format_is_stable() {
        assert_eq!(credential_account("main", "m1", "token"), "main_m1_token");
    }

    #[test]
    fn reference_displays_as_type_colon_name() {
        let profile = Profile::new("dep", "d1");
        assert_eq!(profile.reference().to_string(), "dep:d1");
    }

    #[test]
    fn toml_round_trip() {
        let profile = Profile::new("main", "m1")
            .with_field("host", serde_json::json!("example.com"))
            .with_field("port", serde_json::json!(8080))
            .with_secure_field("token")
            .with_dependency("dep", "d1");

        let doc = toml::to_string_pretty(&profile).unwrap();
        let back: Profile = toml::from_str(&doc).unwrap();
        assert_eq!(back.name, "m1");
        assert_eq!(back.field_str("host"), Some("example.com"));
        assert_eq!(back.secure_fields, vec!["token".to_string()]);
        assert_eq!(back.dependencies[0], ProfileRef::new("dep", "d1"));
    }

    #[test]
    fn field_lookup_misses_return_none() {
        let profile = Profile::new("main", "m1");
        assert!(profile.field("host").is_none());
        assert!(profile.field_str("host").is_none());
    }
}
