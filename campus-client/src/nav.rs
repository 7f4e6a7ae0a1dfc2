//! Routes and the gates that decide which screen is shown.

use crate::session::AuthState;
use campus_core::{AnnouncementId, UserProfile};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SignIn,
    Dashboard,
    Announcements,
    AnnouncementDetail(AnnouncementId),
    Notifications,
    Profile,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::SignIn => "/".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::Announcements => "/announcements".to_string(),
            Route::AnnouncementDetail(id) => format!("/announcements/{}", id),
            Route::Notifications => "/notifications".to_string(),
            Route::Profile => "/profile".to_string(),
        }
    }

    /// Parse a path. Trailing slashes are ignored; unknown paths yield `None`.
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').skip(1).collect();
        match segments.as_slice() {
            [] => Some(Route::SignIn),
            ["dashboard"] => Some(Route::Dashboard),
            ["announcements"] => Some(Route::Announcements),
            ["announcements", id] => id.parse().ok().map(Route::AnnouncementDetail),
            ["notifications"] => Some(Route::Notifications),
            ["profile"] => Some(Route::Profile),
            _ => None,
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, Route::SignIn)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Where to go instead of `requested`, if anywhere.
///
/// Nothing redirects while the identity provider is still initializing.
pub fn guard(requested: Route, auth: &AuthState) -> Option<Route> {
    match auth {
        AuthState::Anonymous if requested.requires_auth() => Some(Route::SignIn),
        _ => None,
    }
}

/// Whether the profile-setup screen must be shown before anything else.
///
/// `profile` is `None` until the profile query has completed.
pub fn needs_profile_setup(auth: &AuthState, profile: Option<&Option<UserProfile>>) -> bool {
    auth.is_authenticated() && matches!(profile, Some(None))
}
