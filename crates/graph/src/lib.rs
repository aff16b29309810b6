//! Microsoft Graph access for Azure AD connections set up by the UCS
//! Office 365 connector.
//!
//! [`AzureAccount`] loads the credentials of one connection alias,
//! [`token`] turns them into an access token and [`GraphApi`] performs the
//! user lookups and updates. Callers depend on the [`GraphUsers`] trait.

pub mod account;
pub mod api;
pub mod token;

use async_trait::async_trait;

pub use account::AzureAccount;
pub use api::GraphApi;

/// Microsoft Graph v1.0 endpoint.
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

/// Azure AD login endpoint issuing tokens.
pub const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("connection {alias} not initialized: {reason}")]
    NotInitialized { alias: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Microsoft Graph error ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Token request failed ({status}): {body}")]
    Token { status: u16, body: String },

    #[error("Could not sign client assertion: {0}")]
    Assertion(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

// ---------------------------------------------------------------------------
// GraphUsers
// ---------------------------------------------------------------------------

/// User operations of the Graph API used by the DLLP tools.
#[async_trait]
pub trait GraphUsers: Send + Sync {
    /// Fetch a user by object id or principal name, restricted to the
    /// `select` properties (all default properties when empty).
    async fn get_user(
        &self,
        id_or_upn: &str,
        select: &[&str],
    ) -> Result<serde_json::Value, GraphError>;

    /// Apply a partial update to the user with object id `id`.
    async fn modify_user(&self, id: &str, patch: &serde_json::Value) -> Result<(), GraphError>;
}
