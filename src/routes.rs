//! Client-side navigation targets and the seam screens use to leave themselves.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    AdminLogin,
    AdminSignup,
    Signup,
    /// Student landing page after password sign-in.
    Homepage,
    /// Quest list; also where the callback screen sends students.
    App,
    Admin,
    Community,
    Redeem,
    Profile,
}

impl Route {
    pub const ALL: [Route; 10] = [
        Route::Login,
        Route::AdminLogin,
        Route::AdminSignup,
        Route::Signup,
        Route::Homepage,
        Route::App,
        Route::Admin,
        Route::Community,
        Route::Redeem,
        Route::Profile,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::AdminLogin => "/admin/login",
            Route::AdminSignup => "/admin/signup",
            Route::Signup => "/signup",
            Route::Homepage => "/Homepage",
            Route::App => "/app",
            Route::Admin => "/admin",
            Route::Community => "/community",
            Route::Redeem => "/redeem",
            Route::Profile => "/profile",
        }
    }

    /// Exact, case-sensitive match; a single trailing slash is tolerated.
    pub fn from_path(path: &str) -> Option<Route> {
        let p = if path.len() > 1 { path.strip_suffix('/').unwrap_or(path) } else { path };
        Route::ALL.iter().copied().find(|r| r.path() == p)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigation {
    pub route: Route,
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
}

impl Navigation {
    pub fn push(route: Route) -> Self { Self { route, replace: false } }
    pub fn replace(route: Route) -> Self { Self { route, replace: true } }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, nav: Navigation);
}

/// Navigator that only remembers where it was sent. Used by the CLI driver and tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new() -> Self { Self::default() }

    pub fn history(&self) -> Vec<Navigation> { self.history.lock().clone() }

    pub fn last(&self) -> Option<Navigation> { self.history.lock().last().copied() }

    pub fn visited(&self, route: Route) -> bool {
        self.history.lock().iter().any(|n| n.route == route)
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, nav: Navigation) {
        tracing::debug!(target: "ecoquest::nav", route = %nav.route, replace = nav.replace, "navigate");
        self.history.lock().push(nav);
    }
}
