//! Student and admin credential screens.
//!
//! Both run the same guard against the shared auth state and the same submit flow; the
//! `Audience` decides which role belongs here and which messages are shown. A successful
//! submit never navigates by itself: the guard does that when the auth state reports the
//! new session with its resolved role.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::guard::{classify, decide, Audience, GuardAction, GuardState};
use crate::auth_state::{AuthContext, AuthSnapshot};
use crate::error::{AppError, AppResult};
use crate::identity::Role;
use crate::liveness::MountScope;
use crate::routes::{Navigation, Navigator, Route};

pub const PASSWORD_MIN_CHARS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialView {
    pub email: String,
    pub password: String,
    pub submitting: bool,
    pub error: Option<String>,
    pub guard: GuardState,
    /// Set once the screen has decided to leave; no further guard decisions are taken.
    pub leaving_to: Option<Navigation>,
    /// Target of the "create an account" link under the form.
    pub signup: Route,
}

impl Default for CredentialView {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            submitting: false,
            error: None,
            guard: GuardState::Loading,
            leaving_to: None,
            signup: Route::Signup,
        }
    }
}

impl CredentialView {
    pub fn shows_form(&self) -> bool {
        self.guard == GuardState::Unauthenticated && self.leaving_to.is_none()
    }
}

pub struct CredentialScreen {
    audience: Audience,
    auth: Arc<AuthContext>,
    nav: Arc<dyn Navigator>,
    redirect_delay: Duration,
    scope: MountScope,
    view: Mutex<CredentialView>,
    pending_redirect: Mutex<Option<JoinHandle<()>>>,
}

impl CredentialScreen {
    pub fn new(audience: Audience, auth: Arc<AuthContext>, nav: Arc<dyn Navigator>, redirect_delay: Duration) -> Self {
        Self {
            audience,
            auth,
            nav,
            redirect_delay,
            scope: MountScope::new(),
            view: Mutex::new(CredentialView { signup: audience.signup_route(), ..Default::default() }),
            pending_redirect: Mutex::new(None),
        }
    }

    pub fn student(auth: Arc<AuthContext>, nav: Arc<dyn Navigator>, redirect_delay: Duration) -> Self {
        Self::new(Audience::Student, auth, nav, redirect_delay)
    }

    pub fn admin(auth: Arc<AuthContext>, nav: Arc<dyn Navigator>, redirect_delay: Duration) -> Self {
        Self::new(Audience::Admin, auth, nav, redirect_delay)
    }

    pub fn audience(&self) -> Audience { self.audience }

    pub fn view(&self) -> CredentialView { self.view.lock().clone() }

    pub fn submit_label(&self) -> &'static str { self.audience.submit_label(self.view.lock().submitting) }

    pub fn set_email(&self, email: &str) { self.view.lock().email = email.to_string(); }

    pub fn set_password(&self, password: &str) { self.view.lock().password = password.to_string(); }

    pub fn unmount(&self) { self.scope.unmount(); }

    /// Follow the sign-up link shown under the form.
    pub fn open_signup(&self) {
        let to = self.view.lock().signup;
        if self.scope.is_mounted() {
            self.nav.navigate(Navigation::push(to));
        }
    }

    /// Run the guard against one auth emission.
    pub async fn on_auth_change(&self, snapshot: &AuthSnapshot) -> GuardState {
        if let Some(st) = self.left_state() {
            return st;
        }
        let state = classify(snapshot, self.audience);
        if !self.scope.is_mounted() {
            return state;
        }
        self.view.lock().guard = state;
        match decide(state, self.audience, self.redirect_delay) {
            GuardAction::Wait | GuardAction::ShowForm => {}
            GuardAction::EnterHome(to) => {
                info!(target: "ecoquest::auth", audience = ?self.audience, route = %to.route, "session matches screen; entering home");
                self.view.lock().leaving_to = Some(to);
                self.nav.navigate(to);
            }
            GuardAction::Evict { warning, after, to } => {
                warn!(target: "ecoquest::auth", audience = ?self.audience, role = ?snapshot.role, "role does not belong on this screen; signing out");
                {
                    let mut v = self.view.lock();
                    v.error = Some(warning.to_string());
                    v.leaving_to = Some(to);
                }
                // sign_out logs its own failure; the redirect happens either way
                let _ = self.auth.sign_out().await;
                let live = self.scope.token();
                let nav = self.nav.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    if live.is_alive() {
                        nav.navigate(to);
                    } else {
                        debug!(target: "ecoquest::auth", route = %to.route, "screen unmounted; redirect dropped");
                    }
                });
                *self.pending_redirect.lock() = Some(handle);
            }
        }
        state
    }

    /// Follow the auth state until the guard takes the screen somewhere else.
    pub async fn watch_until_exit(&self) -> GuardState {
        let mut rx = self.auth.subscribe();
        loop {
            let snap = rx.borrow_and_update().clone();
            let st = self.on_auth_change(&snap).await;
            if st.is_terminal() || !self.scope.is_mounted() {
                return st;
            }
            if rx.changed().await.is_err() {
                return st;
            }
        }
    }

    /// Wait for a scheduled eviction redirect, if any, to fire.
    pub async fn settle(&self) {
        let pending = self.pending_redirect.lock().take();
        if let Some(h) = pending {
            let _ = h.await;
        }
    }

    pub async fn submit(&self) -> AppResult<Role> {
        let live = self.scope.token();
        let (email, password) = {
            let mut v = self.view.lock();
            v.submitting = true;
            v.error = None;
            (v.email.trim().to_string(), v.password.clone())
        };
        let result = self.try_submit(&email, &password).await;
        if let Err(e) = &result {
            if e.is_local() {
                debug!(target: "ecoquest::auth", audience = ?self.audience, code = e.code_str(), "credentials rejected before sign-in");
            } else {
                warn!(target: "ecoquest::auth", audience = ?self.audience, kind = e.kind(), code = e.code_str(), error = %e, "sign-in failed");
            }
        }
        if !live.is_alive() {
            return result;
        }
        let mut v = self.view.lock();
        v.submitting = false;
        if let Err(e) = &result {
            v.error = Some(e.message().to_string());
        }
        result
    }

    async fn try_submit(&self, email: &str, password: &str) -> AppResult<Role> {
        validate_credentials(email, password)?;
        let session = self.auth.client().sign_in_with_password(email, password).await?;
        let role = self.auth.resolver().resolve(&session.user).await;
        if !self.audience.admits(role) {
            debug!(target: "ecoquest::auth", audience = ?self.audience, user = %session.user.id, role = ?role, "sign-in rejected for this screen");
            let _ = self.auth.sign_out().await;
            return Err(AppError::authorization("wrong_audience", self.audience.rejection_message()));
        }
        info!(target: "ecoquest::auth", audience = ?self.audience, user = %session.user.id, "signed in");
        Ok(role.unwrap_or(Role::Student))
    }

    fn left_state(&self) -> Option<GuardState> {
        let v = self.view.lock();
        v.leaving_to.map(|_| v.guard)
    }
}

pub fn validate_credentials(email: &str, password: &str) -> AppResult<()> {
    if email.trim().is_empty() {
        return Err(AppError::validation("email_required", "Email is required"));
    }
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(AppError::validation("password_too_short", "Password must be at least 8 characters"));
    }
    Ok(())
}
