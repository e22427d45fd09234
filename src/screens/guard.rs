//! Role guard shared by the student and admin login screens.
//!
//! `classify` maps an auth snapshot onto one of four states for a given audience and
//! `decide` maps that state to what the screen must do. Both are pure; the screens carry
//! out the action.

use std::time::Duration;

use crate::auth_state::AuthSnapshot;
use crate::identity::{home_route, Role};
use crate::routes::{Navigation, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Student,
    Admin,
}

pub const MSG_ADMIN_ON_STUDENT_SCREEN: &str = "Admins cannot use Student Login. Redirecting to Admin Login...";
pub const MSG_STUDENT_ON_ADMIN_SCREEN: &str = "Students cannot use Admin Login. Redirecting to Student Login...";
pub const MSG_ADMIN_ACCOUNT_REJECTED: &str = "This is an admin account. Please use Admin Login instead.";
pub const MSG_NOT_AN_ADMIN: &str = "This account does not have admin privileges. Use Student Login instead.";

impl Audience {
    /// Unknown roles count as students.
    pub fn admits(&self, role: Option<Role>) -> bool {
        match self {
            Audience::Student => !Role::is_admin(role),
            Audience::Admin => Role::is_admin(role),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Audience::Student => Role::Student,
            Audience::Admin => Role::Admin,
        }
    }

    /// Where a user who landed on the wrong login screen is sent.
    pub fn other_login_route(&self) -> Route {
        match self {
            Audience::Student => Route::AdminLogin,
            Audience::Admin => Route::Login,
        }
    }

    pub fn home(&self) -> Route { home_route(self.role()) }

    pub fn mismatch_warning(&self) -> &'static str {
        match self {
            Audience::Student => MSG_ADMIN_ON_STUDENT_SCREEN,
            Audience::Admin => MSG_STUDENT_ON_ADMIN_SCREEN,
        }
    }

    pub fn rejection_message(&self) -> &'static str {
        match self {
            Audience::Student => MSG_ADMIN_ACCOUNT_REJECTED,
            Audience::Admin => MSG_NOT_AN_ADMIN,
        }
    }

    pub fn submit_label(&self, submitting: bool) -> &'static str {
        match (self, submitting) {
            (_, true) => "Signing in...",
            (Audience::Student, false) => "Sign In",
            (Audience::Admin, false) => "Sign In as Admin",
        }
    }

    /// Sign-up link offered under the form.
    pub fn signup_route(&self) -> Route {
        match self {
            Audience::Student => Route::Signup,
            Audience::Admin => Route::AdminSignup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Unauthenticated,
    AuthenticatedMatching,
    AuthenticatedMismatched,
}

impl GuardState {
    /// States after which the screen navigates away.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GuardState::AuthenticatedMatching | GuardState::AuthenticatedMismatched)
    }
}

pub fn classify(snapshot: &AuthSnapshot, audience: Audience) -> GuardState {
    if snapshot.loading {
        return GuardState::Loading;
    }
    if snapshot.session.is_none() {
        return GuardState::Unauthenticated;
    }
    if audience.admits(snapshot.role) {
        GuardState::AuthenticatedMatching
    } else {
        GuardState::AuthenticatedMismatched
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    Wait,
    ShowForm,
    EnterHome(Navigation),
    /// Sign out, show `warning`, then navigate to `to` once `after` has elapsed.
    Evict { warning: &'static str, after: Duration, to: Navigation },
}

pub fn decide(state: GuardState, audience: Audience, redirect_delay: Duration) -> GuardAction {
    match state {
        GuardState::Loading => GuardAction::Wait,
        GuardState::Unauthenticated => GuardAction::ShowForm,
        GuardState::AuthenticatedMatching => GuardAction::EnterHome(Navigation::replace(audience.home())),
        GuardState::AuthenticatedMismatched => GuardAction::Evict {
            warning: audience.mismatch_warning(),
            after: redirect_delay,
            to: Navigation::replace(audience.other_login_route()),
        },
    }
}
