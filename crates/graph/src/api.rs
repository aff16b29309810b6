//! REST client for the Microsoft Graph `/users` endpoints.
//!
//! The access token is requested on first use and reused for the
//! lifetime of the client; the tools are short-lived, one token suffices.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::token::fetch_token;
use crate::{AzureAccount, GraphError, GraphUsers, DEFAULT_GRAPH_URL, DEFAULT_LOGIN_URL};

/// Graph client bound to one Azure AD connection.
pub struct GraphApi {
    client: reqwest::Client,
    graph_url: String,
    login_url: String,
    account: AzureAccount,
    token: OnceCell<String>,
}

/// Error envelope Graph returns with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl GraphApi {
    /// Client against the public Graph and login endpoints.
    pub fn new(account: AzureAccount) -> Self {
        Self::with_client(
            reqwest::Client::new(),
            DEFAULT_GRAPH_URL.to_string(),
            DEFAULT_LOGIN_URL.to_string(),
            account,
        )
    }

    /// Client reusing an existing [`reqwest::Client`] and custom endpoints.
    pub fn with_client(
        client: reqwest::Client,
        graph_url: String,
        login_url: String,
        account: AzureAccount,
    ) -> Self {
        Self {
            client,
            graph_url,
            login_url,
            account,
            token: OnceCell::new(),
        }
    }

    async fn bearer(&self) -> Result<&str, GraphError> {
        let token = self
            .token
            .get_or_try_init(|| fetch_token(&self.client, &self.login_url, &self.account))
            .await?;
        Ok(token.as_str())
    }

    /// `<graph_url>/users/<id>`, with `id` encoded as a single path segment.
    fn user_url(&self, id: &str) -> Result<Url, GraphError> {
        let mut url =
            Url::parse(&self.graph_url).map_err(|e| GraphError::InvalidUrl(format!("{}: {e}", self.graph_url)))?;
        url.path_segments_mut()
            .map_err(|()| GraphError::InvalidUrl(self.graph_url.clone()))?
            .pop_if_empty()
            .push("users")
            .push(id);
        Ok(url)
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or a [`GraphError::Api`]
    /// carrying Graph's error code and message.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GraphError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (status.canonical_reason().unwrap_or("unknown").to_string(), body),
        };
        Err(GraphError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl GraphUsers for GraphApi {
    async fn get_user(
        &self,
        id_or_upn: &str,
        select: &[&str],
    ) -> Result<serde_json::Value, GraphError> {
        let mut url = self.user_url(id_or_upn)?;
        if !select.is_empty() {
            url.query_pairs_mut().append_pair("$select", &select.join(","));
        }

        let token = self.bearer().await?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let response = Self::ensure_success(response).await?;

        let user: serde_json::Value = response.json().await?;
        if !user.is_object() {
            return Err(GraphError::UnexpectedResponse(format!(
                "user {id_or_upn} is not a JSON object"
            )));
        }
        tracing::debug!(user = id_or_upn, "Fetched Azure AD user");
        Ok(user)
    }

    async fn modify_user(&self, id: &str, patch: &serde_json::Value) -> Result<(), GraphError> {
        let url = self.user_url(id)?;
        let token = self.bearer().await?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(patch)
            .send()
            .await?;
        Self::ensure_success(response).await?;

        tracing::info!(object_id = id, "Updated Azure AD user");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
