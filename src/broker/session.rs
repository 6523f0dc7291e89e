//! Caller identity as seen by the broker.

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    /// GitHub login linked to this account, if any.
    pub github_login: Option<String>,
}

impl CurrentUser {
    pub fn is_linked(&self) -> bool {
        self.github_login.is_some()
    }
}

/// Resolves the caller of the current request.
pub trait Session {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// A session whose caller is fixed up front (CLI invocations, tests).
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    user: Option<CurrentUser>,
}

impl StaticSession {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(id: impl Into<String>, github_login: Option<String>) -> Self {
        Self {
            user: Some(CurrentUser {
                id: id.into(),
                github_login,
            }),
        }
    }
}

impl Session for StaticSession {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.clone()
    }
}
