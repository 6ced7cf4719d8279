use serde::Serialize;
use std::sync::Mutex;

use crate::session::SessionState;

/// Client-side views of the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Route {
    Home,
    HowItWorks,
    About,
    Faq,
    SignIn,
    SignUp,
    Dashboard,
    Report,
}

impl Route {
    pub const ALL: [Route; 8] = [
        Route::Home,
        Route::HowItWorks,
        Route::About,
        Route::Faq,
        Route::SignIn,
        Route::SignUp,
        Route::Dashboard,
        Route::Report,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::HowItWorks => "/how-it-works",
            Route::About => "/about",
            Route::Faq => "/faq",
            Route::SignIn => "/signin",
            Route::SignUp => "/signup",
            Route::Dashboard => "/dashboard",
            Route::Report => "/report",
        }
    }

    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let normalized = if trimmed.is_empty() { "/" } else { trimmed };
        Route::ALL.into_iter().find(|route| route.path() == normalized)
    }

    /// Views that need a signed-in user
    pub fn is_protected(&self) -> bool {
        matches!(self, Route::Dashboard | Route::Report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render(Route),
    /// Session check still running; show a neutral loading state
    Loading,
    Redirect(Route),
}

pub fn guard(route: Route, state: &SessionState) -> RouteDecision {
    if !route.is_protected() {
        return RouteDecision::Render(route);
    }
    if state.is_loading {
        return RouteDecision::Loading;
    }
    if state.is_authenticated() {
        RouteDecision::Render(route)
    } else {
        RouteDecision::Redirect(Route::SignIn)
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that records every visited route
#[derive(Debug, Default)]
pub struct History {
    entries: Mutex<Vec<Route>>,
}

impl History {
    pub fn current(&self) -> Option<Route> {
        self.entries.lock().ok().and_then(|entries| entries.last().copied())
    }

    pub fn entries(&self) -> Vec<Route> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl Navigator for History {
    fn navigate(&self, route: Route) {
        tracing::debug!("Navigating to {}", route.path());
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(route);
        }
    }
}
