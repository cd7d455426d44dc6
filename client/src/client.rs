use std::sync::Arc;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderValue;
use reqwest::header::USER_AGENT;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::trace;

use campus_login::SessionManager;

use crate::error::ClientError;

/// Paths where a 401 means "wrong credentials", not "expired access token".
/// A failure here is surfaced to the caller untouched; refreshing cannot fix
/// it. `/auth/me` is deliberately absent: it is an ordinary protected
/// resource.
const AUTH_ENDPOINTS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/refresh-token",
    "/auth/verify-email-otp",
];

pub(crate) fn is_auth_endpoint(path: &str) -> bool {
    AUTH_ENDPOINTS.contains(&path)
}

/// Campus API client.
///
/// Every request picks up the session's current access token; expired-token
/// failures are recovered through the session manager and replayed once,
/// invisibly to the caller.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionManager>,
    user_agent: HeaderValue,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<SessionManager>,
    ) -> Result<Self, ClientError> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url,
            session,
            user_agent: HeaderValue::from_static("campus-client"),
        })
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        if let Ok(hv) = HeaderValue::from_str(&ua.into()) {
            self.user_agent = hv;
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute_json(Method::GET, path, None).await
    }

    pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body).map_err(ClientError::Serialize)?;
        self.execute_json(Method::POST, path, Some(body)).await
    }

    pub async fn patch_json<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body).map_err(ClientError::Serialize)?;
        self.execute_json(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.execute_json(Method::DELETE, path, None).await
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retried = false;
        loop {
            // Re-read the token on every attempt; a refresh cycle may have
            // replaced it since the previous one.
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(USER_AGENT, self.user_agent.clone());
            if let Some(token) = self.session.access_token() {
                let value = format!("Bearer {token}");
                if let Ok(header) = HeaderValue::from_str(&value) {
                    request = request.header(AUTHORIZATION, header);
                }
            }
            if let Some(body) = &body {
                request = request.json(body);
            }
            trace!("{method} {url}");
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                let text = response.text().await?;
                return decode_json(&url, &text);
            }

            let message = response.text().await.unwrap_or_default();
            if status != StatusCode::UNAUTHORIZED || is_auth_endpoint(path) {
                return Err(ClientError::UnexpectedStatus(status, message));
            }
            if retried {
                // The token minted by the refresh was rejected too; another
                // refresh cannot help.
                debug!("{method} {url} still unauthorized after retry");
                self.session.invalidate();
                return Err(ClientError::UnexpectedStatus(status, message));
            }
            debug!("{method} {url} unauthorized; attempting token refresh");
            self.session.recover_unauthorized().await?;
            retried = true;
        }
    }
}

fn decode_json<T: DeserializeOwned>(url: &str, text: &str) -> Result<T, ClientError> {
    serde_json::from_str(text).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}
