//! Async client for the relay admin HTTP API.
//!
//! Every request goes through one send path, which attaches the
//! bearer token supplied by the [`CredentialProvider`] and turns a 401 into a
//! credential reset before handing the error back to the caller.

use std::{sync::Arc, time::Duration};

use relayadmin_core::{
    API_BASE_PATH, ActiveConnection, CoreError, LoginRequest, LoginResponse,
    RespHistoryStatistic, StatisticQuery, UpdateConnectionRequest, routes, server_message,
    validate_connection_id,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

/// Capability the hosting application hands to the client.
///
/// The client never keeps its own copy of the token: it asks for it on every
/// request and reports every change back through these hooks.
pub trait CredentialProvider: Send + Sync {
    /// Current token, if the operator is logged in.
    fn token(&self) -> Option<String>;

    /// Called with the new token after a login, or `None` once it is dropped.
    fn token_changed(&self, token: Option<&str>);

    /// Called when the server rejects the current credential.
    fn unauthorized(&self);
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(reqwest::Error),
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("no auth token set, log in first")]
    MissingToken,
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED.as_u16()),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Transport(err) | ApiError::Decode(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminClientBuilder {
    server_url: String,
    timeout: Option<Duration>,
    user_agent: String,
    require_token: bool,
}

impl AdminClientBuilder {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            timeout: None,
            user_agent: format!("relayadmin/{}", env!("CARGO_PKG_VERSION")),
            require_token: false,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Per-request timeout. Without one the transport default applies.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// When set, authenticated calls fail with [`ApiError::MissingToken`]
    /// instead of reaching the server without a token.
    #[must_use]
    pub fn require_token(mut self, require_token: bool) -> Self {
        self.require_token = require_token;
        self
    }

    pub fn build<P: CredentialProvider>(
        self,
        credentials: Arc<P>,
    ) -> Result<AdminClient<P>, ApiError> {
        let api_base = api_base_url(&self.server_url)?;

        let mut http = reqwest::Client::builder().user_agent(self.user_agent);
        if let Some(timeout) = self.timeout {
            http = http.timeout(timeout);
        }

        Ok(AdminClient {
            http: http.build()?,
            api_base,
            credentials,
            require_token: self.require_token,
        })
    }
}

pub struct AdminClient<P: CredentialProvider> {
    http: reqwest::Client,
    api_base: Url,
    credentials: Arc<P>,
    require_token: bool,
}

impl<P: CredentialProvider> Clone for AdminClient<P> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            api_base: self.api_base.clone(),
            credentials: Arc::clone(&self.credentials),
            require_token: self.require_token,
        }
    }
}

impl<P: CredentialProvider> std::fmt::Debug for AdminClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("api_base", &self.api_base.as_str())
            .field("require_token", &self.require_token)
            .finish_non_exhaustive()
    }
}

impl<P: CredentialProvider> AdminClient<P> {
    pub fn new(server_url: &str, credentials: Arc<P>) -> Result<Self, ApiError> {
        AdminClientBuilder::new(server_url).build(credentials)
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub fn credentials(&self) -> &Arc<P> {
        &self.credentials
    }

    pub fn has_token(&self) -> bool {
        self.current_token().is_some()
    }

    pub fn set_auth_token(&self, token: Option<&str>) {
        self.credentials.token_changed(token);
    }

    /// Fires the unauthorized hook and then drops the token.
    pub fn clear_auth_token(&self) {
        self.credentials.unauthorized();
        self.credentials.token_changed(None);
    }

    /// `POST /login` with form-encoded credentials.
    ///
    /// A token in the response is handed to the provider; a response without
    /// one leaves the current token untouched.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let url = self.endpoint(routes::LOGIN)?;
        let response = self
            .execute("login", self.http.post(url).form(request))
            .await?;
        let body: LoginResponse = decode(response).await?;

        match body.token.as_deref() {
            Some(token) if !token.is_empty() => {
                info!(username = %request.username, "login succeeded");
                self.set_auth_token(Some(token));
            }
            _ => warn!(username = %request.username, "login response carried no token"),
        }
        Ok(body)
    }

    /// `GET /conn/statistic`: one page of per-connection history.
    pub async fn get_connection_statistic(
        &self,
        query: &StatisticQuery,
    ) -> Result<RespHistoryStatistic, ApiError> {
        query.validate()?;
        self.check_token("get_connection_statistic")?;
        let url = self.endpoint(routes::CONNECTION_STATISTIC)?;
        let response = self
            .execute("get_connection_statistic", self.http.get(url).query(query))
            .await?;
        decode(response).await
    }

    /// `GET /conn/status`: every active connection, unpaginated.
    pub async fn get_connection_status(&self) -> Result<Vec<ActiveConnection>, ApiError> {
        self.check_token("get_connection_status")?;
        let url = self.endpoint(routes::CONNECTION_STATUS)?;
        let response = self
            .execute("get_connection_status", self.http.get(url))
            .await?;
        decode(response).await
    }

    /// `GET /conn/close/:id`. The admin server routes this mutation as a GET.
    pub async fn close_connection(&self, id: &str) -> Result<(), ApiError> {
        validate_connection_id(id)?;
        self.check_token("close_connection")?;
        let mut url = self.endpoint(routes::CLOSE_CONNECTION)?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .push(id);
        self.execute("close_connection", self.http.get(url)).await?;
        info!(id, "connection closed");
        Ok(())
    }

    /// `POST /conn/update` with a JSON body.
    pub async fn update_connection_name(
        &self,
        id: &str,
        custom_name: &str,
    ) -> Result<(), ApiError> {
        validate_connection_id(id)?;
        self.check_token("update_connection_name")?;
        let url = self.endpoint(routes::UPDATE_CONNECTION)?;
        let body = UpdateConnectionRequest {
            id: id.to_owned(),
            custom_name: custom_name.to_owned(),
        };
        self.execute("update_connection_name", self.http.post(url).json(&body))
            .await?;
        info!(id, custom_name, "connection renamed");
        Ok(())
    }

    fn current_token(&self) -> Option<String> {
        self.credentials.token().filter(|token| !token.is_empty())
    }

    fn check_token(&self, operation: &'static str) -> Result<(), ApiError> {
        if self.has_token() {
            return Ok(());
        }
        if self.require_token {
            return Err(ApiError::MissingToken);
        }
        warn!(operation, "called without an auth token set");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.api_base
            .join(path)
            .map_err(|err| ApiError::InvalidUrl(format!("{}{path}: {err}", self.api_base)))
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let request = match self.current_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|err| {
            error!(operation, "API call failed: {err}");
            ApiError::Transport(err)
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "API call succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = server_message(&body);
        error!(operation, status = status.as_u16(), "API call failed: {message}");

        if status == StatusCode::UNAUTHORIZED {
            self.clear_auth_token();
            return Err(ApiError::Unauthorized { message });
        }

        Err(ApiError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response.json::<T>().await.map_err(ApiError::Decode)
}

/// Resolves the `/api/` base every endpoint is joined onto.
///
/// A server URL that already ends in `/api` is used as is.
pub fn api_base_url(server_url: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(server_url.trim())
        .map_err(|err| ApiError::InvalidUrl(format!("{server_url}: {err}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ApiError::InvalidUrl(format!(
            "{server_url}: scheme must be http or https"
        )));
    }

    let path = url.path().trim_end_matches('/').to_owned();
    let api_suffix = API_BASE_PATH.trim_end_matches('/');
    let new_path = if path.ends_with(api_suffix) {
        format!("{path}/")
    } else {
        format!("{path}{API_BASE_PATH}")
    };
    url.set_path(&new_path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
