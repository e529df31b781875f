use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use crate::api::{AuthResponse, LoginRequest, LogoutRequest, RefreshRequest};
use crate::config::Config;
use crate::error::DispatchError;
use crate::observability::metrics::Metrics;
use crate::session::store::{TokenPair, TokenStore};

/// Grace added to the follower wait so a leader that runs up to its own
/// timeout still gets to publish a result first.
const FOLLOWER_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
struct RefreshTick {
    seq: u64,
    ok: bool,
}

/// Owns the token pair and the single-flight refresh protocol. Every
/// authenticated call in the core goes through [`SessionManager::execute`];
/// nothing else touches the tokens.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    refresh_timeout: Duration,
    store: Arc<dyn TokenStore>,
    tokens: RwLock<Option<TokenPair>>,
    refreshing: AtomicBool,
    refresh_done: watch::Sender<RefreshTick>,
    metrics: Arc<Metrics>,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        store: Arc<dyn TokenStore>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| DispatchError::Internal(format!("http client init failed: {err}")))?;

        let (refresh_done, _) = watch::channel(RefreshTick { seq: 0, ok: false });

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            refresh_timeout: config.refresh_timeout,
            store,
            tokens: RwLock::new(None),
            refreshing: AtomicBool::new(false),
            refresh_done,
            metrics,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Load a persisted token pair, if any. Returns whether a session was
    /// restored.
    pub async fn restore(&self) -> Result<bool, DispatchError> {
        let pair = self.store.load().await?;
        let restored = pair.is_some();
        *self.tokens.write().await = pair;
        Ok(restored)
    }

    pub async fn login(&self, phone: &str, password: &str) -> Result<(), DispatchError> {
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest { phone, password })
            .send()
            .await?;

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|err| DispatchError::Internal(format!("malformed login response: {err}")))?;

        match (body.success, body.token, body.refresh_token) {
            (true, Some(access), Some(refresh)) => {
                let pair = TokenPair { access, refresh };
                self.store.save(&pair).await?;
                *self.tokens.write().await = Some(pair);
                debug!("session established");
                Ok(())
            }
            _ => Err(DispatchError::Internal(format!(
                "login rejected: {}",
                body.error.unwrap_or_else(|| "unknown".to_string())
            ))),
        }
    }

    /// Best-effort server-side invalidation, then unconditionally drop the
    /// local pair.
    pub async fn logout(&self) {
        let refresh = self
            .tokens
            .read()
            .await
            .as_ref()
            .map(|pair| pair.refresh.clone());

        if let Some(refresh) = refresh {
            let result = self
                .http
                .post(format!("{}/auth/logout", self.base_url))
                .json(&LogoutRequest {
                    refresh_token: &refresh,
                })
                .send()
                .await;
            if let Err(err) = result {
                warn!(error = %err, "logout request failed; clearing local session anyway");
            }
        }

        self.clear_session().await;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|pair| pair.access.clone())
    }

    /// Run an authenticated request. On 401, one refresh-and-retry cycle;
    /// a second 401 is terminal. The builder closure is invoked again for
    /// the retry so the request body is rebuilt rather than cloned.
    pub async fn execute<F>(&self, build: F) -> Result<reqwest::Response, DispatchError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self
            .access_token()
            .await
            .ok_or(DispatchError::ExpiredSession)?;

        let response = build(&self.http).bearer_auth(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if !self.ensure_fresh(&token).await {
            return Err(DispatchError::ExpiredSession);
        }

        let token = self
            .access_token()
            .await
            .ok_or(DispatchError::ExpiredSession)?;
        let retry = build(&self.http).bearer_auth(&token).send().await?;

        if retry.status() == StatusCode::UNAUTHORIZED {
            self.clear_session().await;
            return Err(DispatchError::ExpiredSession);
        }

        Ok(retry)
    }

    /// Single-flight refresh. `observed_access` is the token the caller just
    /// saw rejected; if the pair has already rotated past it there is
    /// nothing to do. Otherwise exactly one caller (the one winning the
    /// compare-and-set) performs the network refresh and everyone else
    /// awaits its published result.
    pub async fn ensure_fresh(&self, observed_access: &str) -> bool {
        // Subscribe before racing for leadership so a result published
        // between the checks below cannot be missed.
        let mut done_rx = self.refresh_done.subscribe();

        match self.access_token().await {
            Some(current) if current != observed_access => return true,
            Some(_) => {}
            None => return false,
        }

        let is_leader = self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if is_leader {
            // Re-check under leadership: a previous leader may have rotated
            // the pair while we were acquiring the guard.
            let already_rotated = match self.access_token().await {
                Some(current) => current != observed_access,
                None => false,
            };

            let ok = if already_rotated {
                true
            } else {
                match tokio::time::timeout(self.refresh_timeout, self.refresh_once()).await {
                    Ok(ok) => ok,
                    Err(_) => {
                        warn!("token refresh timed out");
                        false
                    }
                }
            };

            if !already_rotated {
                let outcome = if ok { "success" } else { "failure" };
                self.metrics
                    .token_refreshes_total
                    .with_label_values(&[outcome])
                    .inc();
                if !ok {
                    self.clear_session().await;
                }
            }

            let seq = self.refresh_done.borrow().seq + 1;
            let _ = self.refresh_done.send(RefreshTick { seq, ok });
            self.refreshing.store(false, Ordering::Release);
            ok
        } else {
            match tokio::time::timeout(self.refresh_timeout + FOLLOWER_GRACE, done_rx.changed())
                .await
            {
                Ok(Ok(())) => done_rx.borrow().ok,
                _ => {
                    warn!("gave up waiting for in-flight token refresh");
                    false
                }
            }
        }
    }

    /// One network refresh attempt. Never retried: a transport failure here
    /// counts the same as an explicit rejection.
    async fn refresh_once(&self) -> bool {
        let refresh = match self.tokens.read().await.as_ref() {
            Some(pair) => pair.refresh.clone(),
            None => return false,
        };

        let response = match self
            .http
            .post(format!("{}/auth/refresh", self.base_url))
            .json(&RefreshRequest {
                refresh_token: &refresh,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "token refresh transport failure");
                return false;
            }
        };

        let body: AuthResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "malformed refresh response");
                return false;
            }
        };

        match (body.success, body.token) {
            (true, Some(access)) => {
                // The refresh token only rotates when the server says so.
                let pair = TokenPair {
                    access,
                    refresh: body.refresh_token.unwrap_or(refresh),
                };
                if let Err(err) = self.store.save(&pair).await {
                    warn!(error = %err, "failed to persist rotated tokens");
                }
                *self.tokens.write().await = Some(pair);
                debug!("token pair rotated");
                true
            }
            _ => {
                warn!(
                    error = body.error.as_deref().unwrap_or("unknown"),
                    "token refresh rejected"
                );
                false
            }
        }
    }

    async fn clear_session(&self) {
        *self.tokens.write().await = None;
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed to clear persisted tokens");
        }
    }
}
