use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::LoginResponse;
use crate::error::{AppError, ErrorKind, ValidationError};
use crate::model::NavigatorRoot;

/// Opaque bearer token. Never printed.
pub struct Credential(SecretString);

impl Credential {
    /// Returns `None` for an empty or whitespace-only token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(SecretString::new(token)))
        }
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self(SecretString::new(self.0.expose_secret().clone()))
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Anything other than `"admin"` is a regular user.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub credential: Credential,
    pub role: Role,
    pub phone_number: Option<String>,
}

impl Session {
    /// Interprets a successful login response. A missing role means `user`;
    /// a missing token is a rejection.
    pub fn from_login(response: LoginResponse, phone_number: &str) -> Result<Self, AppError> {
        let credential = response
            .token
            .and_then(Credential::new)
            .ok_or_else(|| {
                AppError::new(ErrorKind::Auth, "Login response did not include a token")
            })?;

        Ok(Self {
            credential,
            role: response.role.as_deref().map(Role::parse).unwrap_or_default(),
            phone_number: Some(phone_number.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthStatus {
    /// Persisted session not read yet; navigation is gated.
    #[default]
    Loading,
    Unauthenticated,
    Authenticated(Session),
}

impl AuthStatus {
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.session().map(|s| s.credential.expose())
    }

    #[must_use]
    pub const fn navigator_root(&self) -> NavigatorRoot {
        match self {
            Self::Loading => NavigatorRoot::Loading,
            Self::Unauthenticated => NavigatorRoot::Auth,
            Self::Authenticated(Session {
                role: Role::Admin, ..
            }) => NavigatorRoot::Admin,
            Self::Authenticated(_) => NavigatorRoot::User,
        }
    }
}

/// Strips everything but ASCII digits.
#[must_use]
pub fn normalize_phone(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

pub fn validate_phone(input: &str, min_digits: usize) -> Result<String, ValidationError> {
    let digits = normalize_phone(input);
    if digits.len() < min_digits {
        return Err(ValidationError::phone_too_short(digits.len(), min_digits));
    }
    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn login(token: Option<&str>, role: Option<&str>) -> LoginResponse {
        LoginResponse {
            token: token.map(str::to_string),
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse("moderator"), Role::User);
        assert_eq!(Role::parse(""), Role::User);
    }

    #[test]
    fn login_without_role_is_user() {
        let session = Session::from_login(login(Some("t"), None), "7701").unwrap();
        assert_eq!(session.role, Role::User);
        assert_eq!(session.phone_number.as_deref(), Some("7701"));
    }

    #[test]
    fn login_without_token_is_auth_error() {
        let err = Session::from_login(login(None, Some("admin")), "7701").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);

        let err = Session::from_login(login(Some("  "), None), "7701").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("super-secret").unwrap();
        assert!(!format!("{credential:?}").contains("super-secret"));
        let session = Session {
            credential,
            role: Role::User,
            phone_number: None,
        };
        assert!(!format!("{session:?}").contains("super-secret"));
    }

    #[test]
    fn navigator_root_follows_role() {
        let session = |role| {
            AuthStatus::Authenticated(Session {
                credential: Credential::new("t").unwrap(),
                role,
                phone_number: None,
            })
        };
        assert_eq!(AuthStatus::Loading.navigator_root(), NavigatorRoot::Loading);
        assert_eq!(AuthStatus::Unauthenticated.navigator_root(), NavigatorRoot::Auth);
        assert_eq!(session(Role::Admin).navigator_root(), NavigatorRoot::Admin);
        assert_eq!(session(Role::User).navigator_root(), NavigatorRoot::User);
    }

    #[test]
    fn formatting_is_stripped() {
        assert_eq!(validate_phone("+7 (701) 123-45-67", 10).unwrap(), "77011234567");
        assert!(validate_phone("701-12", 10).is_err());
    }

    proptest! {
        #[test]
        fn phone_accepted_iff_enough_digits(input in "[0-9 ()+-]{0,20}") {
            let digit_count = input.chars().filter(char::is_ascii_digit).count();
            let result = validate_phone(&input, 10);
            prop_assert_eq!(result.is_ok(), digit_count >= 10);
        }
    }
}
