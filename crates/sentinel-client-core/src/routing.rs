#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Landing,
    Login,
    Dashboard,
}

impl View {
    /// Maps a request path to a view. Unknown paths land on the marketing page.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.trim();
        let without_query = trimmed.split(['?', '#']).next().unwrap_or_default();
        match without_query.trim_end_matches('/') {
            "/login" => Self::Login,
            "/dashboard" => Self::Dashboard,
            _ => Self::Landing,
        }
    }

    #[must_use]
    pub fn to_path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
        }
    }

    #[must_use]
    pub fn is_protected(self) -> bool {
        matches!(self, Self::Dashboard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render(View),
    Redirect(View),
}

impl RouteDecision {
    /// The view that ends up on screen after following any redirect.
    #[must_use]
    pub fn view(self) -> View {
        match self {
            Self::Render(view) | Self::Redirect(view) => view,
        }
    }
}

/// Gates a requested view on whether a credential is held.
///
/// A credential counts as held from the moment it is stored, before the
/// identity behind it has been resolved.
#[must_use]
pub fn gate_view(requested: View, has_credential: bool) -> RouteDecision {
    match (requested, has_credential) {
        (View::Landing, _) => RouteDecision::Render(View::Landing),
        (View::Login, false) => RouteDecision::Render(View::Login),
        (View::Login, true) => RouteDecision::Redirect(View::Dashboard),
        (View::Dashboard, true) => RouteDecision::Render(View::Dashboard),
        (View::Dashboard, false) => RouteDecision::Redirect(View::Login),
    }
}
