//! Access tokens via the OAuth2 client-credentials flow.
//!
//! The application authenticates with a certificate: it signs a short-lived
//! RS256 JWT (the client assertion) with the connection's private key and
//! exchanges it at the tenant's token endpoint.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::{AzureAccount, GraphError};

/// Scope requesting the application permissions granted on Graph.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Lifetime of a client assertion in seconds.
const ASSERTION_LIFETIME_SECS: i64 = 600;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AssertionClaims {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    pub jti: String,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Token endpoint of the account's tenant below `login_url`.
pub fn token_endpoint(login_url: &str, account: &AzureAccount) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        login_url.trim_end_matches('/'),
        account.directory_id
    )
}

/// Convert the stored base64 thumbprint into the base64url form `x5t` needs.
fn x5t(thumbprint: &str) -> String {
    thumbprint
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

/// Build and sign the client assertion for `audience` (the token endpoint).
pub fn client_assertion(account: &AzureAccount, audience: &str) -> Result<String, GraphError> {
    let now = Utc::now().timestamp();
    let claims = AssertionClaims {
        aud: audience.to_string(),
        iss: account.application_id.clone(),
        sub: account.application_id.clone(),
        jti: uuid::Uuid::new_v4().to_string(),
        nbf: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.x5t = Some(x5t(&account.cert_thumbprint));

    let key = EncodingKey::from_rsa_pem(&account.private_key_pem)?;
    Ok(jsonwebtoken::encode(&header, &claims, &key)?)
}

/// Exchange a fresh client assertion for a Graph access token.
pub async fn fetch_token(
    client: &reqwest::Client,
    login_url: &str,
    account: &AzureAccount,
) -> Result<String, GraphError> {
    let endpoint = token_endpoint(login_url, account);
    let assertion = client_assertion(account, &endpoint)?;

    let response = client
        .post(&endpoint)
        .form(&[
            ("client_id", account.application_id.as_str()),
            ("scope", GRAPH_SCOPE),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(GraphError::Token {
            status: status.as_u16(),
            body,
        });
    }

    let token: TokenResponse = response.json().await?;
    tracing::debug!(
        alias = %account.alias,
        expires_in = token.expires_in,
        "Acquired Graph access token"
    );
    Ok(token.access_token)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
