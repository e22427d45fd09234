use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use crate::tprintln;

use super::user::AuthUser;

/// Proof of authentication issued by the identity provider. Read-only to the app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl Session {
    pub fn user_id(&self) -> &str { &self.user.id }

    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.expires_at.map(|exp| exp <= now_unix).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn(_) => "signed_in",
            AuthEvent::TokenRefreshed(_) => "token_refreshed",
            AuthEvent::SignedOut => "signed_out",
        }
    }
}

const EVENT_CAPACITY: usize = 32;

/// Holds the provider's current session and fans out auth events to subscribers.
/// Shared by every `IdentityClient` implementation in this crate.
#[derive(Debug)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { current: RwLock::new(None), events }
    }
}

impl SessionStore {
    pub fn current(&self) -> Option<Session> { self.current.read().clone() }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> { self.events.subscribe() }

    pub fn sign_in(&self, session: Session) {
        tprintln!("session.sign_in user={}", session.user.id);
        *self.current.write() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session));
    }

    pub fn refresh(&self, session: Session) {
        *self.current.write() = Some(session.clone());
        self.emit(AuthEvent::TokenRefreshed(session));
    }

    /// Returns whether a session was actually dropped.
    pub fn sign_out(&self) -> bool {
        let had = self.current.write().take().is_some();
        tprintln!("session.sign_out had_session={}", had);
        self.emit(AuthEvent::SignedOut);
        had
    }

    fn emit(&self, ev: AuthEvent) {
        // no subscribers is fine
        let _ = self.events.send(ev);
    }
}

/// 256-bit random token, base64url without padding. Used for PKCE verifiers.
pub fn gen_token() -> String {
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}
