use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::warn;

use crate::token_data::ClaimsInfo;
use crate::token_data::TokenData;
use crate::token_store::TokenStore;

/// A hung refresh call would otherwise stall every queued request
/// indefinitely.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Invoked when the session is beyond recovery and the user has to sign in
/// again, typically by navigating to the login view. Implementations may
/// assume all queued work has already been rejected by the time this fires.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

/// Failures of the refresh cycle. `Clone` so a single failure can fan out to
/// every queued waiter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no refresh token available")]
    NoRefreshToken,
    #[error("refresh rejected with status {status}")]
    RefreshRejected { status: u16 },
    #[error("refresh request failed: {0}")]
    RefreshTransport(String),
    #[error("refresh timed out after {0:?}")]
    RefreshTimeout(Duration),
    #[error("session revoked")]
    SessionRevoked,
}

type Waiter = oneshot::Sender<Result<String, SessionError>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: Vec<Waiter>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

/// Owns the token pair and serializes refresh attempts.
///
/// At most one refresh call is outstanding at any time; callers that hit a
/// 401 while one is in flight queue behind it and are settled, in arrival
/// order, with whatever the exchange produced. Constructed once and shared
/// (`Arc`) with every HTTP call site.
pub struct SessionManager {
    http: reqwest::Client,
    refresh_url: String,
    refresh_timeout: Duration,
    store: Arc<dyn TokenStore>,
    redirect: Arc<dyn LoginRedirect>,
    tokens: Mutex<Option<TokenData>>,
    state: Mutex<RefreshState>,
}

impl SessionManager {
    /// Loads any persisted session from `store`. A corrupt store is treated
    /// as signed-out rather than a hard failure.
    pub fn new(
        base_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let tokens = match store.load() {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!("failed to load stored session: {err}");
                None
            }
        };
        Self {
            http: reqwest::Client::new(),
            refresh_url: format!("{base_url}/auth/refresh-token"),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            store,
            redirect,
            tokens: Mutex::new(tokens),
            state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Current access token, if any. May be one refresh cycle stale while a
    /// renewal is in flight; callers tolerate a single retry instead of
    /// assuming immediate consistency.
    pub fn access_token(&self) -> Option<String> {
        lock(&self.tokens)
            .as_ref()
            .map(|tokens| tokens.access_token.clone())
    }

    pub fn claims(&self) -> Option<ClaimsInfo> {
        lock(&self.tokens)
            .as_ref()
            .map(|tokens| tokens.claims.clone())
    }

    /// Install the pair returned by login/registration and write it through
    /// to the store.
    pub fn adopt_tokens(&self, tokens: TokenData) {
        self.install_tokens(tokens);
    }

    /// Drop the session without a redirect; the caller is navigating anyway.
    pub fn logout(&self) {
        self.clear_session();
    }

    /// Terminal path for a request that failed again after its one retry:
    /// the freshly minted token was rejected too, so another refresh cannot
    /// help.
    pub fn invalidate(&self) {
        warn!("session invalidated after an already-retried request failed again");
        self.clear_session();
        self.redirect.redirect_to_login();
    }

    /// Entry point for the HTTP layer when a request fails with 401.
    ///
    /// Exactly one caller drives the refresh exchange; everyone arriving
    /// while it is in flight queues behind it. On success every queued
    /// caller resolves with the new access token, in arrival order. On
    /// failure the session is cleared, every queued caller is rejected with
    /// the same error, and the login redirect fires exactly once.
    pub async fn recover_unauthorized(&self) -> Result<String, SessionError> {
        enum Entry {
            Wait(oneshot::Receiver<Result<String, SessionError>>),
            Refresh(String),
            MissingRefreshToken,
        }

        // Flag and queue are only ever touched with the lock held, and the
        // lock is never held across an await.
        let entry = {
            let mut state = lock(&self.state);
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Entry::Wait(rx)
            } else {
                let refresh_token = lock(&self.tokens)
                    .as_ref()
                    .map(|tokens| tokens.refresh_token.clone());
                match refresh_token {
                    Some(refresh_token) => {
                        state.refreshing = true;
                        Entry::Refresh(refresh_token)
                    }
                    None => Entry::MissingRefreshToken,
                }
            }
        };

        match entry {
            Entry::Wait(rx) => {
                debug!("refresh already in flight; waiting for it to settle");
                match rx.await {
                    Ok(outcome) => outcome,
                    // Flight owner vanished without draining the queue.
                    Err(_) => Err(SessionError::SessionRevoked),
                }
            }
            Entry::MissingRefreshToken => {
                // Never call the backend with an absent refresh token.
                debug!("unauthorized with no refresh token; clearing session");
                self.clear_session();
                self.redirect.redirect_to_login();
                Err(SessionError::NoRefreshToken)
            }
            Entry::Refresh(refresh_token) => {
                match self.exchange_refresh_token(&refresh_token).await {
                    Ok(tokens) => {
                        let access_token = tokens.access_token.clone();
                        self.install_tokens(tokens);
                        let waiters = self.finish_cycle();
                        debug!(
                            queued = waiters.len(),
                            "refresh succeeded; replaying queued requests"
                        );
                        for waiter in waiters {
                            // A waiter that gave up just dropped its receiver.
                            let _ = waiter.send(Ok(access_token.clone()));
                        }
                        Ok(access_token)
                    }
                    Err(err) => {
                        warn!("refresh failed: {err}");
                        self.clear_session();
                        let waiters = self.finish_cycle();
                        for waiter in waiters {
                            let _ = waiter.send(Err(err.clone()));
                        }
                        // Only the flight owner redirects; one failed cycle,
                        // one redirect, however many requests were queued.
                        self.redirect.redirect_to_login();
                        Err(err)
                    }
                }
            }
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenData, SessionError> {
        match tokio::time::timeout(self.refresh_timeout, self.post_refresh(refresh_token)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SessionError::RefreshTimeout(self.refresh_timeout)),
        }
    }

    async fn post_refresh(&self, refresh_token: &str) -> Result<TokenData, SessionError> {
        debug!("exchanging refresh token at {}", self.refresh_url);
        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|err| SessionError::RefreshTransport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            // Any non-success status is a refresh failure, body content
            // notwithstanding.
            return Err(SessionError::RefreshRejected {
                status: status.as_u16(),
            });
        }
        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|err| SessionError::RefreshTransport(err.to_string()))?;
        Ok(TokenData::from_raw(body.access_token, body.refresh_token))
    }

    fn install_tokens(&self, tokens: TokenData) {
        if let Err(err) = self.store.save(&tokens) {
            warn!("failed to persist session tokens: {err}");
        }
        *lock(&self.tokens) = Some(tokens);
    }

    fn clear_session(&self) {
        *lock(&self.tokens) = None;
        if let Err(err) = self.store.clear() {
            warn!("failed to clear token store: {err}");
        }
    }

    /// Leave the Refreshing state, taking the queued waiters along. Flag and
    /// queue move together under one lock, so a late arrival either joined
    /// this cycle or starts a fresh one.
    fn finish_cycle(&self) -> Vec<Waiter> {
        let mut state = lock(&self.state);
        state.refreshing = false;
        std::mem::take(&mut state.waiters)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
