//! Users and the permission checks made against them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ApiError, ApiRequest, HandlerResult, Logic, decode_body, validate_request_body};

/// Permission that grants every other permission.
pub const WILDCARD_PERMISSION: &str = "*";

const USER_REQUIRED_FIELDS: &[&str] = &["username", "email", "permissions", "full_name", "password"];
const USER_ACCEPTED_FIELDS: &[&str] = &["timezone", "session_timeout_ms", "roles", "startpage"];
const USER_UPDATE_ACCEPTED_FIELDS: &[&str] = &[
    "email",
    "full_name",
    "password",
    "permissions",
    "timezone",
    "session_timeout_ms",
    "roles",
    "startpage",
];

/// A user account.
///
/// The password is only ever read from requests; it is stripped from every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Generated identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Login name, unique across users.
    pub username: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub full_name: String,
    /// Plain password; present on create requests and in the savefile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Permissions granted directly to the user.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Names of the roles the user is a member of.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Preferred time zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Session timeout in milliseconds.
    #[serde(default)]
    pub session_timeout_ms: i64,
    /// Built-in users cannot be modified.
    #[serde(default)]
    pub read_only: bool,
    /// Whether the user comes from an external directory.
    #[serde(default)]
    pub external: bool,
}

impl User {
    /// Creates a user with a name and password and nothing else.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            username: username.into(),
            email: String::new(),
            full_name: String::new(),
            password: Some(password.into()),
            permissions: Vec::new(),
            roles: Vec::new(),
            timezone: None,
            session_timeout_ms: 0,
            read_only: false,
            external: false,
        }
    }

    /// Struct-level validation run by the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_empty() {
            return Err("username is required".to_string());
        }
        Ok(())
    }

    /// Whether the user's own permissions grant `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        permissions_grant(&self.permissions, permission)
    }

    /// A copy fit for a response body.
    pub fn without_password(mut self) -> Self {
        self.password = None;
        self
    }
}

/// Whether any of `granted` covers `permission`.
///
/// `*` covers everything; `users:*` covers every `users:` permission.
pub fn permissions_grant(granted: &[String], permission: &str) -> bool {
    granted.iter().any(|g| {
        if g == WILDCARD_PERMISSION || g == permission {
            return true;
        }
        match g.strip_suffix('*') {
            Some(prefix) => permission.starts_with(prefix),
            None => false,
        }
    })
}

/// Response body of the user list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersBody {
    /// The users.
    pub users: Vec<User>,
}

/// GET /users
pub async fn handle_get_users(
    _user: Option<User>,
    lgc: Arc<Logic>,
    _req: ApiRequest,
) -> HandlerResult<UsersBody> {
    Ok(Some(UsersBody {
        users: lgc.get_users()?,
    }))
}

/// GET /users/{username}
pub async fn handle_get_user(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<User> {
    Ok(Some(lgc.get_user(req.param("username"))?))
}

/// POST /users
pub async fn handle_create_user(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "users:create")?;
    let body = validate_request_body(&req.body, USER_REQUIRED_FIELDS, &[], USER_ACCEPTED_FIELDS)?;
    let new_user: User = decode_body(body)?;
    lgc.add_user(new_user)?;
    Ok(None)
}

/// PUT /users/{username}
///
/// Fields absent from the body keep their stored value.
pub async fn handle_update_user(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "users:edit")?;
    let username = req.param("username").to_string();
    let current = lgc.get_user_with_password(&username)?;
    let patch = validate_request_body(&req.body, &[], &[], USER_UPDATE_ACCEPTED_FIELDS)?;

    let mut merged = match serde_json::to_value(&current) {
        Ok(Value::Object(map)) => map,
        _ => return Err(ApiError::internal("failed to encode the stored user")),
    };
    merged.extend(patch);
    let mut updated: User = decode_body(merged)?;
    updated.username = username;
    lgc.update_user(updated)?;
    Ok(None)
}

/// DELETE /users/{username}
pub async fn handle_delete_user(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "users:edit")?;
    lgc.delete_user(req.param("username"))?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(granted: &[&str]) -> Vec<String> {
        granted.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn wildcard_grants_everything() {
        assert!(permissions_grant(&perms(&["*"]), "users:edit"));
        assert!(permissions_grant(&perms(&["*"]), "anything"));
    }

    #[test]
    fn prefix_wildcards() {
        let granted = perms(&["users:*"]);
        assert!(permissions_grant(&granted, "users:edit"));
        assert!(!permissions_grant(&granted, "roles:edit"));
    }

    #[test]
    fn exact_match_only() {
        let granted = perms(&["users:list"]);
        assert!(permissions_grant(&granted, "users:list"));
        assert!(!permissions_grant(&granted, "users:edit"));
        assert!(!permissions_grant(&[], "users:list"));
    }

    #[test]
    fn password_is_never_serialized_once_stripped() {
        let user = User::new("alice", "secret");
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["password"], "secret");
        let value = serde_json::to_value(user.without_password()).unwrap();
        assert!(value.get("password").is_none());
        assert!(value.get("id").is_none());
    }

    #[test]
    fn empty_username_is_invalid() {
        assert!(User::new("", "pw").validate().is_err());
        assert!(User::new("bob", "pw").validate().is_ok());
    }
}
