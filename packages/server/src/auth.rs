//! Session gate.
//!
//! Requests carry a `session` cookie. The token is resolved against the
//! configured session table; `/private` routes need any known session and
//! `/admin` routes need an admin one.

use std::collections::BTreeMap;

use actix_web::HttpRequest;
use desa_sos_database_models::UserRow;
use desa_sos_realtime::SESSION_COOKIE;
use desa_sos_server_models::{ApiProfile, Role};
use serde::Deserialize;

use crate::service::ServiceError;

/// One row of the configured session table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionEntry {
    /// Cookie value.
    pub token: String,
    /// User the session belongs to.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Phone number on file.
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Portal role.
    pub role: Role,
}

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User id.
    pub user_id: String,
    /// Display name.
    pub display_name: String,
    /// Phone number on file.
    pub phone_number: Option<String>,
    /// Portal role.
    pub role: Role,
}

impl Principal {
    /// Whether the user may use `/admin`.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The user as a store row.
    #[must_use]
    pub fn to_user_row(&self) -> UserRow {
        UserRow {
            id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            phone_number: self.phone_number.clone(),
        }
    }

    /// The user as returned by `GET /private/me`.
    #[must_use]
    pub fn to_profile(&self) -> ApiProfile {
        ApiProfile {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            phone_number: self.phone_number.clone(),
            role: self.role,
        }
    }
}

/// Token → principal lookup.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<String, Principal>,
}

impl SessionRegistry {
    /// Builds the registry from configured entries. Later entries with the
    /// same token win.
    #[must_use]
    pub fn from_entries(entries: &[SessionEntry]) -> Self {
        let sessions = entries
            .iter()
            .map(|e| {
                (
                    e.token.clone(),
                    Principal {
                        user_id: e.user_id.clone(),
                        display_name: e.display_name.clone(),
                        phone_number: e.phone_number.clone(),
                        role: e.role,
                    },
                )
            })
            .collect();
        Self { sessions }
    }

    /// Looks up a session token.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<&Principal> {
        self.sessions.get(token)
    }

    /// Every distinct user with a session.
    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.sessions.values()
    }

    /// Resolves the session cookie of `req`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] if the cookie is missing or
    /// unknown.
    pub fn authenticate(&self, req: &HttpRequest) -> Result<Principal, ServiceError> {
        let cookie = req
            .cookie(SESSION_COOKIE)
            .ok_or(ServiceError::Unauthorized)?;
        self.resolve(cookie.value())
            .cloned()
            .ok_or(ServiceError::Unauthorized)
    }

    /// Resolves the session cookie of `req` and requires an admin.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] without a valid session and
    /// [`ServiceError::Forbidden`] for non-admins.
    pub fn require_admin(&self, req: &HttpRequest) -> Result<Principal, ServiceError> {
        let principal = self.authenticate(req)?;
        if !principal.is_admin() {
            log::warn!("User {} denied admin access", principal.user_id);
            return Err(ServiceError::Forbidden);
        }
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::from_entries(&[
            SessionEntry {
                token: "a".to_string(),
                user_id: "admin-1".to_string(),
                display_name: "Pak Kades".to_string(),
                phone_number: None,
                role: Role::Admin,
            },
            SessionEntry {
                token: "w".to_string(),
                user_id: "warga-1".to_string(),
                display_name: "Bu Sri".to_string(),
                phone_number: Some("0812".to_string()),
                role: Role::Warga,
            },
        ])
    }

    #[test]
    fn missing_or_unknown_cookie_is_unauthorized() {
        let registry = registry();
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            registry.authenticate(&req),
            Err(ServiceError::Unauthorized)
        ));

        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "nope"))
            .to_http_request();
        assert!(matches!(
            registry.authenticate(&req),
            Err(ServiceError::Unauthorized)
        ));
    }

    #[test]
    fn warga_is_forbidden_from_admin() {
        let registry = registry();
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "w"))
            .to_http_request();
        assert_eq!(registry.authenticate(&req).unwrap().user_id, "warga-1");
        assert!(matches!(
            registry.require_admin(&req),
            Err(ServiceError::Forbidden)
        ));
    }

    #[test]
    fn admin_passes() {
        let registry = registry();
        let req = TestRequest::default()
            .cookie(Cookie::new(SESSION_COOKIE, "a"))
            .to_http_request();
        assert!(registry.require_admin(&req).unwrap().is_admin());
    }
}
