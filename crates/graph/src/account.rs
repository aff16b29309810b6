//! Credentials of one Azure AD connection.
//!
//! The Office 365 connector's setup wizard stores, per connection alias,
//! a directory below `/etc/univention-office365/`:
//!
//! | File       | Content                                              |
//! |------------|------------------------------------------------------|
//! | `ids.json` | `application_id` and `directory_id` (tenant)         |
//! | `cert.fp`  | base64 SHA-1 thumbprint of the application certificate |
//! | `key.pem`  | RSA private key of the application certificate       |
//!
//! A connection counts as initialised only when all three are present.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::GraphError;

/// Root directory of the connector's per-connection configuration.
pub const DEFAULT_OFFICE365_DIR: &str = "/etc/univention-office365";

#[derive(Debug, Deserialize)]
struct Ids {
    #[serde(default)]
    application_id: String,
    #[serde(default)]
    directory_id: String,
}

/// Loaded credentials of an initialised connection.
#[derive(Clone)]
pub struct AzureAccount {
    pub alias: String,
    pub application_id: String,
    pub directory_id: String,
    pub cert_thumbprint: String,
    pub private_key_pem: Vec<u8>,
}

impl std::fmt::Debug for AzureAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureAccount")
            .field("alias", &self.alias)
            .field("application_id", &self.application_id)
            .field("directory_id", &self.directory_id)
            .field("cert_thumbprint", &self.cert_thumbprint)
            .finish_non_exhaustive()
    }
}

impl AzureAccount {
    /// Load the connection `alias` from `root`.
    ///
    /// Any missing or incomplete file yields [`GraphError::NotInitialized`].
    pub fn load(root: &Path, alias: &str) -> Result<Self, GraphError> {
        let dir = root.join(alias);
        let not_initialized = |reason: String| GraphError::NotInitialized {
            alias: alias.to_string(),
            reason,
        };

        let ids_raw = read(&dir.join("ids.json")).map_err(&not_initialized)?;
        let ids: Ids = serde_json::from_slice(&ids_raw)
            .map_err(|e| not_initialized(format!("ids.json is invalid: {e}")))?;
        if ids.application_id.is_empty() || ids.directory_id.is_empty() {
            return Err(not_initialized(
                "ids.json lacks application_id or directory_id".to_string(),
            ));
        }

        let thumbprint = read(&dir.join("cert.fp")).map_err(&not_initialized)?;
        let cert_thumbprint = String::from_utf8_lossy(&thumbprint).trim().to_string();
        if cert_thumbprint.is_empty() {
            return Err(not_initialized("cert.fp is empty".to_string()));
        }

        let private_key_pem = read(&dir.join("key.pem")).map_err(&not_initialized)?;

        tracing::debug!(alias, application_id = %ids.application_id, "Loaded Azure AD connection");

        Ok(Self {
            alias: alias.to_string(),
            application_id: ids.application_id,
            directory_id: ids.directory_id,
            cert_thumbprint,
            private_key_pem,
        })
    }
}

fn read(path: &PathBuf) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("{}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
