//! Office 365 connector attributes stored on directory users.
//!
//! The connector keeps, per Azure AD connection alias, the principal name
//! and object id of the linked cloud account in the UDM property
//! `UniventionOffice365Data`. On the wire that property is
//! `base64(zlib(json))`.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// UDM property names
// ---------------------------------------------------------------------------

pub const PROP_OFFICE365_DATA: &str = "UniventionOffice365Data";
pub const PROP_CONNECTION_ALIAS: &str = "UniventionOffice365ADConnectionAlias";
pub const PROP_OFFICE365_ENABLED: &str = "UniventionOffice365Enabled";
pub const PROP_MAIL_PRIMARY_ADDRESS: &str = "mailPrimaryAddress";

/// Alias used by the connector when only one connection is configured.
pub const DEFAULT_CONNECTION_ALIAS: &str = "defaultADconnection";

// ---------------------------------------------------------------------------
// AzureLink
// ---------------------------------------------------------------------------

/// Cross-reference from a directory user to its cloud account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureLink {
    pub user_principal_name: String,
    pub object_id: String,
}

// ---------------------------------------------------------------------------
// Office365Data
// ---------------------------------------------------------------------------

/// Decoded `UniventionOffice365Data`: connection alias to link details.
///
/// Entries are kept as raw JSON so that fields written by other connector
/// versions survive a decode/encode cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Office365Data(BTreeMap<String, serde_json::Value>);

impl Office365Data {
    /// Decode the LDAP representation.
    pub fn from_ldap(encoded: &str) -> Result<Self, CoreError> {
        let compressed = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CoreError::malformed("Office 365 data", format!("base64: {e}")))?;

        let mut json_bytes = Vec::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_end(&mut json_bytes)
            .map_err(|e| CoreError::malformed("Office 365 data", format!("zlib: {e}")))?;

        serde_json::from_slice(&json_bytes)
            .map_err(|e| CoreError::malformed("Office 365 data", format!("json: {e}")))
    }

    /// Encode into the LDAP representation.
    pub fn to_ldap_string(&self) -> Result<String, CoreError> {
        let json_bytes = serde_json::to_vec(&self.0)
            .map_err(|e| CoreError::Validation(format!("Office 365 data not serializable: {e}")))?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json_bytes)?;
        Ok(STANDARD.encode(encoder.finish()?))
    }

    /// Set (or replace) the link for `alias`.
    pub fn set_link(&mut self, alias: &str, link: &AzureLink) {
        self.0.insert(
            alias.to_string(),
            json!({
                "userPrincipalName": link.user_principal_name,
                "objectId": link.object_id,
            }),
        );
    }

    /// The link stored for `alias`, if it has the expected shape.
    pub fn link(&self, alias: &str) -> Option<AzureLink> {
        self.0
            .get(alias)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Value for the cloud account's `onPremisesImmutableId`: the directory
/// entry's `entryUUID`, base64-encoded.
pub fn immutable_id(entry_uuid: &str) -> String {
    STANDARD.encode(entry_uuid.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
