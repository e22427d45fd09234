//! Headless screen controllers. Each owns its view state and a `MountScope`; renderers read
//! the view, forward user input, and observe navigation through the `Navigator`.

pub mod guard;
pub mod login;
pub mod callback;
pub mod profile;

pub use guard::{Audience, GuardAction, GuardState};
pub use login::{CredentialScreen, CredentialView};
pub use callback::{CallbackHandler, CallbackOutcome, CallbackParams};
pub use profile::{ProfileScreen, ProfileView, Tab};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Success,
}

/// Inline banner shown under a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl ScreenMessage {
    pub fn error<S: Into<String>>(text: S) -> Self { Self { kind: MessageKind::Error, text: text.into() } }
    pub fn success<S: Into<String>>(text: S) -> Self { Self { kind: MessageKind::Success, text: text.into() } }
    pub fn is_error(&self) -> bool { self.kind == MessageKind::Error }
}
