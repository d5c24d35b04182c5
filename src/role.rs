//! Roles and role membership.
//!
//! Membership is stored on the user side (`User::roles`); the store keeps it consistent
//! when roles are renamed or deleted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ApiRequest, HandlerResult, Logic, User, decode_body, validate_request_body};

const ROLE_REQUIRED_FIELDS: &[&str] = &["name", "permissions"];
const ROLE_ALLOWED_FIELDS: &[&str] = &["description"];

/// A named set of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Name, unique across roles.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Permissions granted to every member.
    pub permissions: Vec<String>,
    /// Built-in roles cannot be modified or deleted.
    #[serde(default)]
    pub read_only: bool,
}

impl Role {
    /// Creates a role with the given name and permissions.
    pub fn new(name: impl Into<String>, permissions: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
            read_only: false,
        }
    }

    /// Struct-level validation run by the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name is required".to_string());
        }
        if self.permissions.is_empty() {
            return Err("permissions is required".to_string());
        }
        Ok(())
    }
}

/// The writable part of a role, as sent on create and update.
#[derive(Debug, Serialize)]
pub(crate) struct RoleRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: &'a String,
    permissions: &'a [String],
}

impl<'a> From<&'a Role> for RoleRequest<'a> {
    fn from(role: &'a Role) -> Self {
        Self {
            name: &role.name,
            description: &role.description,
            permissions: &role.permissions,
        }
    }
}

/// Response body of the role list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesBody {
    /// The roles.
    pub roles: Vec<Role>,
    /// Number of roles.
    pub total: usize,
}

/// Response body of the role member list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMembersBody {
    /// The role name.
    pub role: String,
    /// Members, without passwords.
    pub users: Vec<User>,
}

/// GET /roles
pub async fn handle_get_roles(
    _user: Option<User>,
    lgc: Arc<Logic>,
    _req: ApiRequest,
) -> HandlerResult<RolesBody> {
    let (roles, total) = lgc.get_roles()?;
    Ok(Some(RolesBody { roles, total }))
}

/// GET /roles/{rolename}
pub async fn handle_get_role(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<Role> {
    Ok(Some(lgc.get_role(req.param("rolename"))?))
}

/// POST /roles
pub async fn handle_create_role(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<Role> {
    lgc.authorize(user.as_ref(), "roles:create")?;
    let body = validate_request_body(&req.body, ROLE_REQUIRED_FIELDS, ROLE_ALLOWED_FIELDS, &[])?;
    let role: Role = decode_body(body)?;
    Ok(Some(lgc.add_role(role)?))
}

/// PUT /roles/{rolename}
pub async fn handle_update_role(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<Role> {
    lgc.authorize(user.as_ref(), "roles:edit")?;
    let body = validate_request_body(&req.body, ROLE_REQUIRED_FIELDS, ROLE_ALLOWED_FIELDS, &[])?;
    let role: Role = decode_body(body)?;
    Ok(Some(lgc.update_role(req.param("rolename"), role)?))
}

/// DELETE /roles/{rolename}
pub async fn handle_delete_role(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "roles:delete")?;
    lgc.delete_role(req.param("rolename"))?;
    Ok(None)
}

/// GET /roles/{rolename}/members
pub async fn handle_get_role_members(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<RoleMembersBody> {
    let role = req.param("rolename").to_string();
    let users = lgc.get_role_members(&role)?;
    Ok(Some(RoleMembersBody { role, users }))
}

/// PUT /roles/{rolename}/members/{username}
pub async fn handle_add_user_to_role(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "roles:edit")?;
    lgc.add_user_to_role(req.param("username"), req.param("rolename"))?;
    Ok(None)
}

/// DELETE /roles/{rolename}/members/{username}
pub async fn handle_remove_user_from_role(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "roles:edit")?;
    lgc.remove_user_from_role(req.param("username"), req.param("rolename"))?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_name_and_permissions() {
        assert!(Role::new("reader", &["users:list"]).validate().is_ok());
        assert!(Role::new("", &["users:list"]).validate().is_err());
        assert!(Role::new("reader", &[]).validate().is_err());
    }

    #[test]
    fn read_only_defaults_to_false() {
        let role: Role =
            serde_json::from_str(r#"{"name": "r", "permissions": ["*"]}"#).unwrap();
        assert!(!role.read_only);
        assert_eq!(role.description, "");
    }

    #[test]
    fn role_request_leaves_out_read_only() {
        let mut role = Role::new("r", &["*"]);
        role.read_only = true;
        let body = serde_json::to_value(RoleRequest::from(&role)).unwrap();
        assert_eq!(body, serde_json::json!({"name": "r", "permissions": ["*"]}));
    }
}
