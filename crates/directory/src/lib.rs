//! Directory-service access for the DLLP tools.
//!
//! The UCS directory is reached through its own command-line tools rather
//! than a direct LDAP connection, so that UDM's property mapping, syntax
//! checks and listener triggers apply exactly as for an administrator.
//! [`DirectoryService`] is the seam the account linker depends on;
//! [`UdmCli`] is the production implementation.

pub mod command;
pub mod udm;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use udm::UdmCli;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {elapsed_ms}ms")]
    Timeout { program: String, elapsed_ms: u64 },

    #[error("{program} failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("No entryUUID returned for {dn}")]
    MissingEntryUuid { dn: String },

    #[error("Modification of {dn} rejected: {message}")]
    Rejected { dn: String, message: String },
}

// ---------------------------------------------------------------------------
// DirectoryUser
// ---------------------------------------------------------------------------

/// A `users/user` object as listed by UDM.
///
/// Properties are multi-valued; single-valued properties hold one entry.
/// Empty properties are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryUser {
    pub dn: String,
    pub properties: BTreeMap<String, Vec<String>>,
}

impl DirectoryUser {
    /// First value of `property`, if set.
    pub fn first(&self, property: &str) -> Option<&str> {
        self.values(property).first().map(String::as_str)
    }

    pub fn values(&self, property: &str) -> &[String] {
        self.properties
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// UserChanges
// ---------------------------------------------------------------------------

/// Property changes to apply to one user in a single modify call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    /// Replace the property's value.
    pub set: Vec<(String, String)>,
    /// Add a value to a multi-valued property.
    pub append: Vec<(String, String)>,
}

impl UserChanges {
    pub fn set(mut self, property: &str, value: impl Into<String>) -> Self {
        self.set.push((property.to_string(), value.into()));
        self
    }

    pub fn append(mut self, property: &str, value: impl Into<String>) -> Self {
        self.append.push((property.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.append.is_empty()
    }

    /// The value `property` will have after the change, if it is set.
    pub fn value_of(&self, property: &str) -> Option<&str> {
        self.set
            .iter()
            .rev()
            .find(|(k, _)| k == property)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// DirectoryService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// All users whose `uid` equals `uid`.
    async fn find_users_by_uid(&self, uid: &str) -> Result<Vec<DirectoryUser>, DirectoryError>;

    /// The `entryUUID` operational attribute of the entry at `dn`.
    async fn entry_uuid(&self, dn: &str) -> Result<String, DirectoryError>;

    async fn modify_user(&self, dn: &str, changes: &UserChanges) -> Result<(), DirectoryError>;
}
