//! Process-wide auth state: `{session, role, loading}`.
//!
//! `AuthContext` is created once at application start and handed to every screen as an
//! `Arc`. It changes only in response to the identity client: its auth events, or the
//! explicit `refresh_role` / `sign_out` calls that go through the client. Screens observe it
//! through a `watch` channel and never write to it. Dropping the context (or calling
//! `shutdown`) stops the event listener.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::identity::{AuthEvent, IdentityClient, Role, RoleResolver, Session};

#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub session: Option<Session>,
    pub role: Option<Role>,
    /// True until the first resolution completes, and again while a new session's role is
    /// being resolved. Guards must not act on a loading snapshot.
    pub loading: bool,
}

impl Default for AuthSnapshot {
    fn default() -> Self { Self { session: None, role: None, loading: true } }
}

impl AuthSnapshot {
    pub fn settled(session: Option<Session>, role: Option<Role>) -> Self {
        Self { session, role, loading: false }
    }

    pub fn is_admin(&self) -> bool { Role::is_admin(self.role) }
}

pub struct AuthContext {
    client: Arc<dyn IdentityClient>,
    resolver: RoleResolver,
    state: watch::Sender<AuthSnapshot>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AuthContext {
    /// A context that is still loading and not yet listening. `start` is the normal entry.
    pub fn new(client: Arc<dyn IdentityClient>, resolver: RoleResolver) -> Arc<Self> {
        let (state, _) = watch::channel(AuthSnapshot::default());
        Arc::new(Self { client, resolver, state, listener: Mutex::new(None) })
    }

    /// Resolve the current session's role, then follow the client's auth events.
    pub async fn start(client: Arc<dyn IdentityClient>, resolver: RoleResolver) -> Arc<Self> {
        let ctx = Self::new(client, resolver);
        // Subscribe before the initial load so nothing emitted in between is lost.
        let events = ctx.client.subscribe();
        ctx.refresh_role().await;
        let handle = tokio::spawn(listen(Arc::downgrade(&ctx), events));
        *ctx.listener.lock() = Some(handle);
        let snap = ctx.snapshot();
        info!(
            target: "ecoquest::auth",
            signed_in = snap.session.is_some(),
            role = snap.role.map(|r| r.as_str()).unwrap_or("-"),
            "auth context started"
        );
        ctx
    }

    pub fn snapshot(&self) -> AuthSnapshot { self.state.borrow().clone() }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> { self.state.subscribe() }

    pub fn client(&self) -> &Arc<dyn IdentityClient> { &self.client }

    pub fn resolver(&self) -> &RoleResolver { &self.resolver }

    /// Wait until the state is not loading and return it.
    pub async fn settled(&self) -> AuthSnapshot {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(|s| !s.loading).await {
            Ok(s) => s.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    /// Re-read the client's session and re-derive its role.
    pub async fn refresh_role(&self) {
        let session = self.client.current_session();
        let role = match &session {
            Some(s) => self.resolver.resolve(&s.user).await,
            None => None,
        };
        self.publish(AuthSnapshot::settled(session, role));
    }

    pub async fn sign_out(&self) -> AppResult<()> {
        let res = self.client.sign_out().await;
        self.publish(AuthSnapshot::settled(None, None));
        res.map_err(|e| {
            error!(target: "ecoquest::auth", error = %e, "sign-out failed");
            AppError::from(e)
        })
    }

    pub fn is_listening(&self) -> bool {
        self.listener.lock().as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub fn shutdown(&self) {
        if let Some(h) = self.listener.lock().take() {
            h.abort();
            debug!(target: "ecoquest::auth", "auth listener stopped");
        }
    }

    async fn apply(&self, ev: AuthEvent) {
        debug!(target: "ecoquest::auth", event = ev.name(), "auth event");
        match ev {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) => {
                let prev_role = self.state.borrow().role;
                self.publish(AuthSnapshot { session: Some(s.clone()), role: prev_role, loading: true });
                let role = self.resolver.resolve(&s.user).await;
                // A sign-out (or another sign-in) may have landed while resolving.
                let still_current = self.client.current_session().map(|c| c.user.id == s.user.id).unwrap_or(false);
                if !still_current {
                    debug!(target: "ecoquest::auth", user = %s.user.id, "dropping stale role resolution");
                    return;
                }
                self.publish(AuthSnapshot::settled(Some(s), role));
            }
            AuthEvent::SignedOut => self.publish(AuthSnapshot::settled(None, None)),
        }
    }

    fn publish(&self, next: AuthSnapshot) {
        self.state.send_if_modified(|cur| {
            if *cur == next {
                false
            } else {
                *cur = next;
                true
            }
        });
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) { self.shutdown(); }
}

async fn listen(ctx: Weak<AuthContext>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(ev) => {
                let Some(ctx) = ctx.upgrade() else { break };
                ctx.apply(ev).await;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(target: "ecoquest::auth", skipped = n, "auth events lagged; re-reading session");
                let Some(ctx) = ctx.upgrade() else { break };
                ctx.refresh_role().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
