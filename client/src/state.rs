use arena_protocol::UserProfile;

/// Who is using this client right now.
///
/// `user` is present only when `is_logged_in` and the profile fetch has
/// completed; between the two, `loading` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_logged_in: bool,
    pub user: Option<UserProfile>,
    pub loading: bool,
}

/// Named view of a [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    ResolvingProfile,
    LoggedIn,
    LoggedOut,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_logged_in: false,
            user: None,
            loading: true,
        }
    }
}

impl SessionState {
    pub(crate) fn logged_out() -> Self {
        Self {
            is_logged_in: false,
            user: None,
            loading: false,
        }
    }

    pub(crate) fn resolving() -> Self {
        Self {
            is_logged_in: true,
            user: None,
            loading: true,
        }
    }

    pub(crate) fn logged_in(user: UserProfile) -> Self {
        Self {
            is_logged_in: true,
            user: Some(user),
            loading: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.loading, self.is_logged_in, &self.user) {
            (true, false, _) => SessionPhase::Uninitialized,
            (true, true, _) => SessionPhase::ResolvingProfile,
            (false, true, Some(_)) => SessionPhase::LoggedIn,
            (false, _, _) => SessionPhase::LoggedOut,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(UserProfile::is_admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserProfile {
        UserProfile {
            id: 1,
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            is_staff: false,
            is_superuser: false,
        }
    }

    #[test]
    fn phases() {
        assert_eq!(SessionState::default().phase(), SessionPhase::Uninitialized);
        assert_eq!(SessionState::resolving().phase(), SessionPhase::ResolvingProfile);
        assert_eq!(SessionState::logged_in(alice()).phase(), SessionPhase::LoggedIn);
        assert_eq!(SessionState::logged_out().phase(), SessionPhase::LoggedOut);
    }

    #[test]
    fn admin_requires_profile() {
        assert!(!SessionState::resolving().is_admin());
        assert!(!SessionState::logged_in(alice()).is_admin());

        let staff = UserProfile {
            is_staff: true,
            ..alice()
        };
        assert!(SessionState::logged_in(staff).is_admin());
    }
}
