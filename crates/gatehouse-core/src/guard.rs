//! Route guard.
//!
//! [`decide`] is the pure decision table. [`RouteGuard`] adds the
//! one-redirect-per-situation memory, and [`watch_routes`] drives a
//! [`Navigator`] from the auth store's state.

use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub use crate::config::GuardConfig;
use crate::store::AuthState;

/// Route identifier used when a location has no usable path.
pub const INDEX_ROUTE: &str = "index";

/// Where the user currently is.
///
/// `pathname` is preferred; `segments` are the router's structural segments
/// (including route groups such as `(tabs)`) and serve as a fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteLocation {
    pub pathname: Option<String>,
    pub segments: Vec<String>,
}

fn strip_group(segment: &str) -> String {
    segment.replace(['(', ')'], "")
}

impl RouteLocation {
    /// Builds a location from a path such as `/profile/edit`.
    pub fn from_path(path: &str) -> Self {
        Self {
            pathname: Some(path.to_string()),
            segments: path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Returns the route identifier.
    ///
    /// First path component (leading `/` removed, empty means `index`);
    /// without a path, the last router segment with group parentheses
    /// stripped.
    pub fn current_route(&self) -> String {
        if let Some(pathname) = self.pathname.as_deref().filter(|p| !p.is_empty()) {
            let first = pathname
                .trim_start_matches('/')
                .split('/')
                .next()
                .unwrap_or_default();
            return if first.is_empty() {
                INDEX_ROUTE.to_string()
            } else {
                first.to_string()
            };
        }

        self.segments
            .last()
            .map(|segment| strip_group(segment))
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| INDEX_ROUTE.to_string())
    }

    /// Returns true if `route` names this location or any component of it.
    ///
    /// Matching is by whole-segment equality, so `signup-success` does not
    /// match `signup`.
    pub fn matches(&self, route: &str) -> bool {
        if self.current_route() == route {
            return true;
        }
        let path_hit = self
            .pathname
            .as_deref()
            .is_some_and(|path| path.split('/').any(|component| component == route));
        path_hit
            || self
                .segments
                .iter()
                .any(|segment| strip_group(segment) == route)
    }

    /// Returns true if the location matches any of the public routes.
    pub fn is_public(&self, public_routes: &[String]) -> bool {
        public_routes.iter().any(|route| self.matches(route))
    }

    /// Returns the path form of this location.
    pub fn display_path(&self) -> String {
        match &self.pathname {
            Some(path) => path.clone(),
            None => format!("/{}", self.segments.join("/")),
        }
    }
}

/// What the screen should do for the current state and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    /// Auth is still initializing; show a loading indicator.
    Loading,
    /// Show the requested content.
    Render,
    /// Navigate away, replacing the current location.
    Redirect(String),
    /// A redirect for this situation was already issued; keep waiting.
    Hold,
}

impl GuardConfig {
    /// Route identifier of the login screen, derived from `redirect_to`.
    pub fn login_route(&self) -> String {
        RouteLocation::from_path(&self.redirect_to).current_route()
    }
}

/// Pure decision table.
pub fn decide(
    is_authenticated: bool,
    is_loading: bool,
    location: &RouteLocation,
    config: &GuardConfig,
) -> GuardAction {
    if is_loading {
        return GuardAction::Loading;
    }

    let on_login = location.matches(&config.login_route());
    if is_authenticated {
        if on_login {
            GuardAction::Redirect(config.home_route.clone())
        } else {
            GuardAction::Render
        }
    } else if on_login || location.is_public(&config.public_routes) {
        GuardAction::Render
    } else {
        GuardAction::Redirect(config.redirect_to.clone())
    }
}

/// Stateful guard issuing at most one redirect per
/// `(is_authenticated, route)` pair.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    config: GuardConfig,
    last: Option<(bool, String)>,
    redirected: bool,
}

impl RouteGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            last: None,
            redirected: false,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Decides for `state` at `location`, suppressing repeated redirects.
    pub fn evaluate(&mut self, state: &AuthState, location: &RouteLocation) -> GuardAction {
        let is_authenticated = state.is_authenticated();
        let action = decide(is_authenticated, state.is_loading, location, &self.config);
        if action == GuardAction::Loading {
            return action;
        }

        let key = (is_authenticated, location.current_route());
        if self.last.as_ref() != Some(&key) {
            self.last = Some(key);
            self.redirected = false;
        }

        match action {
            GuardAction::Redirect(_) if self.redirected => GuardAction::Hold,
            GuardAction::Redirect(target) => {
                self.redirected = true;
                GuardAction::Redirect(target)
            }
            other => other,
        }
    }

    /// Evaluates at the navigator's location and performs any redirect.
    ///
    /// A failed `replace` falls back to `push`.
    ///
    /// # Errors
    /// Returns an error if both navigation methods fail.
    pub fn apply(&mut self, state: &AuthState, navigator: &mut dyn Navigator) -> Result<GuardAction> {
        let location = navigator.location();
        let action = self.evaluate(state, &location);
        if let GuardAction::Redirect(target) = &action {
            tracing::debug!(from = %location.display_path(), to = %target, "guard redirect");
            if let Err(err) = navigator.replace(target) {
                tracing::warn!("Router replace failed, trying push: {err:#}");
                navigator.push(target)?;
            }
        }
        Ok(action)
    }
}

/// Navigation capability used by the guard.
pub trait Navigator: Send {
    /// Returns the current location.
    fn location(&self) -> RouteLocation;

    /// Replaces the current location with `target`.
    ///
    /// # Errors
    /// Returns an error if navigation is not possible.
    fn replace(&mut self, target: &str) -> Result<()>;

    /// Pushes `target` on top of the current location.
    ///
    /// # Errors
    /// Returns an error if navigation is not possible.
    fn push(&mut self, target: &str) -> Result<()>;
}

/// In-memory navigation stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryNavigator {
    history: Vec<String>,
}

impl HistoryNavigator {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            history: vec![initial.into()],
        }
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn current(&self) -> &str {
        self.history.last().map_or("/", String::as_str)
    }
}

impl Navigator for HistoryNavigator {
    fn location(&self) -> RouteLocation {
        RouteLocation::from_path(self.current())
    }

    fn replace(&mut self, target: &str) -> Result<()> {
        match self.history.last_mut() {
            Some(current) => *current = target.to_string(),
            None => self.history.push(target.to_string()),
        }
        Ok(())
    }

    fn push(&mut self, target: &str) -> Result<()> {
        self.history.push(target.to_string());
        Ok(())
    }
}

/// Re-runs the guard on every auth state change until cancelled or the
/// store goes away.
pub async fn watch_routes(
    mut auth: watch::Receiver<AuthState>,
    navigator: &mut dyn Navigator,
    guard: &mut RouteGuard,
    cancel: CancellationToken,
) {
    loop {
        let state = auth.borrow_and_update().clone();
        if let Err(err) = guard.apply(&state, navigator) {
            tracing::warn!("Navigation failed: {err:#}");
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            changed = auth.changed() => if changed.is_err() { return },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use gatehouse_types::{AuthSession, AuthUser};

    use super::*;

    fn state(is_authenticated: bool, is_loading: bool) -> AuthState {
        let now = Utc::now();
        let user = AuthUser {
            id: "u1".to_string(),
            email: "a@b.co".to_string(),
            email_verified: None,
            name: None,
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        let session = AuthSession {
            id: "u1".to_string(),
            user_id: "u1".to_string(),
            token: "token".to_string(),
            expires_at: now + Duration::hours(1),
            user: None,
        };
        AuthState {
            user: is_authenticated.then_some(user),
            session: is_authenticated.then_some(session),
            is_loading,
        }
    }

    #[test]
    fn test_current_route_prefers_pathname() {
        let location = RouteLocation {
            pathname: Some("/profile/edit".to_string()),
            segments: vec!["(tabs)".to_string(), "settings".to_string()],
        };
        assert_eq!(location.current_route(), "profile");
        assert_eq!(RouteLocation::from_path("/").current_route(), "index");
    }

    #[test]
    fn test_current_route_falls_back_to_segments() {
        let location = RouteLocation {
            pathname: None,
            segments: vec!["(auth)".to_string(), "(tabs)".to_string()],
        };
        assert_eq!(location.current_route(), "tabs");
        assert_eq!(RouteLocation::default().current_route(), "index");
    }

    #[test]
    fn test_public_matching_uses_whole_segments() {
        let public = GuardConfig::default().public_routes;
        assert!(RouteLocation::from_path("/signup").is_public(&public));
        assert!(RouteLocation::from_path("/(auth)/forgot-password").is_public(&public));
        assert!(!RouteLocation::from_path("/signup-success").is_public(&public));
        assert!(!RouteLocation::from_path("/profile").is_public(&public));
    }

    #[test]
    fn test_decision_table() {
        let config = GuardConfig::default();
        let profile = RouteLocation::from_path("/profile");
        let login = RouteLocation::from_path("/login");

        assert_eq!(decide(false, true, &profile, &config), GuardAction::Loading);
        assert_eq!(decide(true, true, &login, &config), GuardAction::Loading);
        assert_eq!(decide(false, false, &login, &config), GuardAction::Render);
        assert_eq!(
            decide(false, false, &profile, &config),
            GuardAction::Redirect("/login".to_string())
        );
        assert_eq!(
            decide(true, false, &login, &config),
            GuardAction::Redirect("/(tabs)".to_string())
        );
        assert_eq!(decide(true, false, &profile, &config), GuardAction::Render);
    }

    #[test]
    fn test_unauthenticated_profile_redirects_exactly_once() {
        let mut guard = RouteGuard::new(GuardConfig::default());
        let location = RouteLocation::from_path("/profile");
        let signed_out = state(false, false);

        assert_eq!(
            guard.evaluate(&signed_out, &location),
            GuardAction::Redirect("/login".to_string())
        );
        assert_eq!(guard.evaluate(&signed_out, &location), GuardAction::Hold);
        assert_eq!(guard.evaluate(&signed_out, &location), GuardAction::Hold);
    }

    #[test]
    fn test_redirect_flag_resets_when_situation_changes() {
        let mut guard = RouteGuard::new(GuardConfig::default());
        let profile = RouteLocation::from_path("/profile");
        let settings = RouteLocation::from_path("/settings");
        let signed_out = state(false, false);

        assert!(matches!(
            guard.evaluate(&signed_out, &profile),
            GuardAction::Redirect(_)
        ));
        // Loading does not reset the flag.
        assert_eq!(guard.evaluate(&state(false, true), &profile), GuardAction::Loading);
        assert_eq!(guard.evaluate(&signed_out, &profile), GuardAction::Hold);
        // A different route does.
        assert!(matches!(
            guard.evaluate(&signed_out, &settings),
            GuardAction::Redirect(_)
        ));
    }

    #[test]
    fn test_authenticated_decisions() {
        let mut guard = RouteGuard::new(GuardConfig::default());
        let signed_in = state(true, false);
        assert_eq!(
            guard.evaluate(&signed_in, &RouteLocation::from_path("/login")),
            GuardAction::Redirect("/(tabs)".to_string())
        );
        assert_eq!(
            guard.evaluate(&signed_in, &RouteLocation::from_path("/profile")),
            GuardAction::Render
        );
    }

    struct ReplaceFails {
        pushed: Vec<String>,
    }

    impl Navigator for ReplaceFails {
        fn location(&self) -> RouteLocation {
            RouteLocation::from_path("/profile")
        }
        fn replace(&mut self, _target: &str) -> Result<()> {
            anyhow::bail!("replace unsupported")
        }
        fn push(&mut self, target: &str) -> Result<()> {
            self.pushed.push(target.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_replace_failure_falls_back_to_push() {
        let mut guard = RouteGuard::new(GuardConfig::default());
        let mut navigator = ReplaceFails { pushed: Vec::new() };

        let action = guard.apply(&state(false, false), &mut navigator).unwrap();
        assert_eq!(action, GuardAction::Redirect("/login".to_string()));
        assert_eq!(navigator.pushed, vec!["/login".to_string()]);
    }

    #[test]
    fn test_history_navigator_replace_then_render() {
        let mut guard = RouteGuard::new(GuardConfig::default());
        let mut navigator = HistoryNavigator::new("/profile");

        guard.apply(&state(false, false), &mut navigator).unwrap();
        assert_eq!(navigator.history(), ["/login".to_string()]);

        let action = guard.apply(&state(false, false), &mut navigator).unwrap();
        assert_eq!(action, GuardAction::Render);
    }

    #[tokio::test]
    async fn test_watch_routes_follows_state_changes() {
        let (tx, rx) = watch::channel(state(false, true));
        let cancel = CancellationToken::new();
        let mut navigator = HistoryNavigator::new("/profile");
        let mut guard = RouteGuard::new(GuardConfig::default());

        let driver = {
            let cancel = cancel.clone();
            async move {
                watch_routes(rx, &mut navigator, &mut guard, cancel).await;
                navigator
            }
        };
        let handle = tokio::spawn(driver);

        tx.send_replace(state(false, false));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();

        let navigator = handle.await.unwrap();
        assert_eq!(navigator.current(), "/login");
    }
}
