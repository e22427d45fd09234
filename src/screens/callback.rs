//! Landing screen for email-confirmation and OAuth redirects.
//!
//! `process` consumes whatever the provider put on the redirect URL and establishes the
//! session; `resolve` then picks a destination from the auth state once both processing
//! and the auth state itself have settled.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use url::Url;
use tracing::{error, info, warn};

use crate::auth_state::{AuthContext, AuthSnapshot};
use crate::error::{AppError, AppResult};
use crate::liveness::{Liveness, MountScope};
use crate::routes::{Navigation, Navigator, Route};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl CallbackParams {
    /// Query carries `code`/`error`/`error_description`; the fragment carries the tokens.
    /// Empty values count as absent.
    pub fn from_url(url: &Url) -> Self {
        let mut p = Self::default();
        for (k, v) in url.query_pairs() {
            let v = Some(v.into_owned()).filter(|s| !s.is_empty());
            match k.as_ref() {
                "code" => p.code = v,
                "error" => p.error = v,
                "error_description" => p.error_description = v,
                _ => {}
            }
        }
        if let Some(frag) = url.fragment() {
            for (k, v) in url::form_urlencoded::parse(frag.as_bytes()) {
                let v = Some(v.into_owned()).filter(|s| !s.is_empty());
                match k.as_ref() {
                    "access_token" => p.access_token = v,
                    "refresh_token" => p.refresh_token = v,
                    _ => {}
                }
            }
        }
        p
    }

    /// Accepts an absolute URL or a site-relative one such as `/auth/callback?code=...`.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let url = match Url::parse(raw) {
            Ok(u) => u,
            Err(_) => Url::parse("http://localhost/")
                .and_then(|base| base.join(raw))
                .map_err(|e| AppError::validation("bad_callback_url".to_string(), format!("unparsable callback url: {}", e)))?,
        };
        Ok(Self::from_url(&url))
    }

    pub fn has_tokens(&self) -> bool { self.access_token.is_some() && self.refresh_token.is_some() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The provider reported an error; sent to login.
    ProviderError,
    /// The URL could not be parsed; sent to login.
    Malformed,
    /// The code exchange failed; sent to login.
    ExchangeFailed,
    CodeExchanged,
    TokensAdopted,
    /// Neither a code nor tokens; the auth state decides on its own.
    NothingToDo,
}

impl CallbackOutcome {
    pub fn abandoned(&self) -> bool {
        matches!(self, CallbackOutcome::ProviderError | CallbackOutcome::Malformed | CallbackOutcome::ExchangeFailed)
    }
}

pub struct CallbackHandler {
    auth: Arc<AuthContext>,
    nav: Arc<dyn Navigator>,
    settle_delay: Duration,
    scope: MountScope,
    processing: Mutex<bool>,
    left_to: Mutex<Option<Navigation>>,
}

impl CallbackHandler {
    pub fn new(auth: Arc<AuthContext>, nav: Arc<dyn Navigator>, settle_delay: Duration) -> Self {
        Self {
            auth,
            nav,
            settle_delay,
            scope: MountScope::new(),
            processing: Mutex::new(true),
            left_to: Mutex::new(None),
        }
    }

    pub fn is_processing(&self) -> bool { *self.processing.lock() }

    pub fn destination(&self) -> Option<Navigation> { *self.left_to.lock() }

    pub fn unmount(&self) { self.scope.unmount(); }

    pub async fn process(&self, params: &CallbackParams) -> CallbackOutcome {
        let live = self.scope.token();
        let outcome = if let Some(err) = &params.error {
            error!(
                target: "ecoquest::callback",
                error = %err,
                description = params.error_description.as_deref().unwrap_or(""),
                "provider redirected with an error"
            );
            self.leave(Route::Login, &live);
            return CallbackOutcome::ProviderError;
        } else if let Some(code) = &params.code {
            match self.auth.client().exchange_code_for_session(code).await {
                Err(e) => {
                    error!(target: "ecoquest::callback", error = %e, "code exchange failed");
                    self.leave(Route::Login, &live);
                    return CallbackOutcome::ExchangeFailed;
                }
                Ok(session) => {
                    info!(target: "ecoquest::callback", user = %session.user.id, "code exchanged");
                    if live.is_alive() {
                        self.auth.refresh_role().await;
                    }
                    CallbackOutcome::CodeExchanged
                }
            }
        } else if let (Some(access), Some(refresh)) = (&params.access_token, &params.refresh_token) {
            if let Err(e) = self.auth.client().set_session(access, refresh).await {
                // No session will show up; the destination check sends the user to login.
                warn!(target: "ecoquest::callback", error = %e, "redirect tokens rejected");
            }
            tokio::time::sleep(self.settle_delay).await;
            if live.is_alive() {
                self.auth.refresh_role().await;
            }
            CallbackOutcome::TokensAdopted
        } else {
            CallbackOutcome::NothingToDo
        };
        if live.is_alive() {
            *self.processing.lock() = false;
        }
        outcome
    }

    /// Destination once processing is done and the auth state is not loading.
    pub fn resolve(&self, snapshot: &AuthSnapshot) -> Option<Navigation> {
        if let Some(done) = self.destination() {
            return Some(done);
        }
        if self.is_processing() || snapshot.loading {
            return None;
        }
        let route = match &snapshot.session {
            None => Route::Login,
            Some(_) if snapshot.is_admin() => Route::Admin,
            Some(_) => Route::App,
        };
        self.leave(route, &self.scope.token())
    }

    /// Parse, process, then wait for the auth state to settle and navigate.
    pub async fn run(&self, raw_url: &str) -> Option<Navigation> {
        let live = self.scope.token();
        let params = match CallbackParams::parse(raw_url) {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "ecoquest::callback", error = %e, "malformed callback url");
                return self.leave(Route::Login, &live);
            }
        };
        if self.process(&params).await.abandoned() {
            return self.destination();
        }
        let mut rx = self.auth.subscribe();
        loop {
            let snap = rx.borrow_and_update().clone();
            if let Some(n) = self.resolve(&snap) {
                return Some(n);
            }
            if !live.is_alive() || rx.changed().await.is_err() {
                return None;
            }
        }
    }

    fn leave(&self, route: Route, live: &Liveness) -> Option<Navigation> {
        if !live.is_alive() {
            return None;
        }
        let to = Navigation::replace(route);
        *self.left_to.lock() = Some(to);
        self.nav.navigate(to);
        Some(to)
    }
}
