//! # Logic Layer
//!
//! `Logic` sits between the HTTP handlers and the store. It authenticates and authorizes
//! callers, turns store results into status-carrying [`ApiError`]s, strips passwords
//! from outgoing users, and persists the store after successful mutations.
//!
//! ```text
//! dispatch wrapper -> resource handlers -> Logic -> DataStore
//!                                            \-> SavefileManager
//! ```
//!
//! Persistence happens after the mutating store call has returned, so no store lock is
//! held during file I/O. A failed save is logged and does not fail the request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    Alert, AlertCondition, AlertQuery, ApiError, DataStore, IndexSet, IndexSetStats, Input,
    Role, SavefileManager, User, permissions_grant,
};

/// Business operations of the mock server.
pub struct Logic {
    store: Arc<dyn DataStore>,
    auth_enabled: bool,
    savefile: Option<SavefileManager>,
}

impl Logic {
    /// Creates a logic layer over `store` with authentication enabled and no savefile.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            auth_enabled: true,
            savefile: None,
        }
    }

    /// Enables or disables authentication.
    pub fn with_auth(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Persists the store to `savefile` after every mutation.
    pub fn with_savefile(mut self, savefile: SavefileManager) -> Self {
        self.savefile = Some(savefile);
        self
    }

    /// Whether requests must carry basic credentials.
    pub fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// The underlying store, for seeding and inspection.
    pub fn store(&self) -> &dyn DataStore {
        self.store.as_ref()
    }

    /// Writes the store to the savefile, if one is configured.
    ///
    /// Failures are logged and swallowed.
    pub fn safe_save(&self) {
        if let Some(savefile) = &self.savefile {
            if let Err(e) = savefile.save_store(self.store.as_ref()) {
                tracing::error!(
                    path = %savefile.path().display(),
                    error = %e,
                    "failed to save data"
                );
            }
        }
    }

    /// Checks a user name and password.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, ApiError> {
        match self.store.get_user(username)? {
            Some(user) if user.password.as_deref() == Some(password) => {
                Ok(user.without_password())
            }
            _ => Err(ApiError::unauthorized("authentication failed")),
        }
    }

    /// Checks that `user` holds `permission`, directly or through a role.
    ///
    /// `None` means authentication is disabled and everything is permitted.
    pub fn authorize(&self, user: Option<&User>, permission: &str) -> Result<(), ApiError> {
        let Some(user) = user else {
            return Ok(());
        };
        if user.has_permission(permission) {
            return Ok(());
        }
        for name in &user.roles {
            if let Some(role) = self.store.get_role(name)? {
                if permissions_grant(&role.permissions, permission) {
                    return Ok(());
                }
            }
        }
        Err(ApiError::forbidden(format!(
            "The user {} has no permission {}",
            user.username, permission
        )))
    }

    fn saved<T>(&self, result: T) -> T {
        self.safe_save();
        result
    }

    ////////////////////////////////////////////// Index sets //////////////////////////////////////////////

    /// Lists index sets with their total and, when asked, their statistics.
    pub fn get_index_sets(
        &self,
        with_stats: bool,
    ) -> Result<(Vec<IndexSet>, usize, HashMap<String, IndexSetStats>), ApiError> {
        let index_sets = self.store.list_index_sets()?;
        let stats = if with_stats {
            self.store.list_index_set_stats()?
        } else {
            HashMap::new()
        };
        let total = index_sets.len();
        Ok((index_sets, total, stats))
    }

    /// Retrieves an index set.
    pub fn get_index_set(&self, id: &str) -> Result<IndexSet, ApiError> {
        self.store
            .get_index_set(id)?
            .ok_or_else(|| ApiError::not_found(format!("No indexSet found with id {}", id)))
    }

    /// Adds an index set.
    pub fn add_index_set(&self, index_set: IndexSet) -> Result<IndexSet, ApiError> {
        let added = self.store.add_index_set(index_set)?;
        Ok(self.saved(added))
    }

    /// Updates an index set.
    pub fn update_index_set(&self, index_set: IndexSet) -> Result<IndexSet, ApiError> {
        let updated = self.store.update_index_set(index_set)?;
        Ok(self.saved(updated))
    }

    /// Deletes an index set.
    pub fn delete_index_set(&self, id: &str) -> Result<(), ApiError> {
        self.store.delete_index_set(id)?;
        self.safe_save();
        Ok(())
    }

    /// Makes an index set the default.
    pub fn set_default_index_set(&self, id: &str) -> Result<IndexSet, ApiError> {
        let index_set = self.store.set_default_index_set(id)?;
        Ok(self.saved(index_set))
    }

    /// Retrieves the statistics of one index set.
    pub fn get_index_set_stats(&self, id: &str) -> Result<IndexSetStats, ApiError> {
        self.store
            .index_set_stats(id)?
            .ok_or_else(|| ApiError::not_found(format!("No indexSet found with id {}", id)))
    }

    /// Sums the statistics of all index sets.
    pub fn get_all_index_sets_stats(&self) -> Result<IndexSetStats, ApiError> {
        Ok(self.store.total_index_set_stats()?)
    }

    //////////////////////////////////////////////// Alerts ////////////////////////////////////////////////

    /// Runs an alert query.
    pub fn get_alerts(&self, query: &AlertQuery) -> Result<(Vec<Alert>, usize), ApiError> {
        Ok(self.store.query_alerts(query)?)
    }

    /// Retrieves an alert.
    pub fn get_alert(&self, id: &str) -> Result<Alert, ApiError> {
        self.store
            .get_alert(id)?
            .ok_or_else(|| ApiError::not_found(format!("No alert found with id {}", id)))
    }

    /// Adds an alert.
    pub fn add_alert(&self, alert: Alert) -> Result<Alert, ApiError> {
        let added = self.store.add_alert(alert)?;
        Ok(self.saved(added))
    }

    /// Lists alert conditions and their total.
    pub fn get_alert_conditions(&self) -> Result<(Vec<AlertCondition>, usize), ApiError> {
        let conditions = self.store.list_alert_conditions()?;
        let total = conditions.len();
        Ok((conditions, total))
    }

    /// Adds an alert condition.
    pub fn add_alert_condition(
        &self,
        condition: AlertCondition,
    ) -> Result<AlertCondition, ApiError> {
        let added = self.store.add_alert_condition(condition)?;
        Ok(self.saved(added))
    }

    //////////////////////////////////////////////// Users /////////////////////////////////////////////////

    /// Lists users without passwords.
    pub fn get_users(&self) -> Result<Vec<User>, ApiError> {
        Ok(self
            .store
            .list_users()?
            .into_iter()
            .map(User::without_password)
            .collect())
    }

    /// Retrieves a user without its password.
    pub fn get_user(&self, username: &str) -> Result<User, ApiError> {
        Ok(self.get_user_with_password(username)?.without_password())
    }

    /// Retrieves a user as stored, for merging updates.
    pub(crate) fn get_user_with_password(&self, username: &str) -> Result<User, ApiError> {
        self.store
            .get_user(username)?
            .ok_or_else(|| ApiError::not_found(format!("No user found with name {}", username)))
    }

    /// Adds a user.
    pub fn add_user(&self, user: User) -> Result<User, ApiError> {
        let added = self.store.add_user(user)?;
        Ok(self.saved(added.without_password()))
    }

    /// Updates a user.
    pub fn update_user(&self, user: User) -> Result<User, ApiError> {
        let updated = self.store.update_user(user)?;
        Ok(self.saved(updated.without_password()))
    }

    /// Deletes a user.
    pub fn delete_user(&self, username: &str) -> Result<(), ApiError> {
        self.store.delete_user(username)?;
        self.safe_save();
        Ok(())
    }

    //////////////////////////////////////////////// Roles /////////////////////////////////////////////////

    /// Lists roles and their total.
    pub fn get_roles(&self) -> Result<(Vec<Role>, usize), ApiError> {
        let roles = self.store.list_roles()?;
        let total = roles.len();
        Ok((roles, total))
    }

    /// Retrieves a role.
    pub fn get_role(&self, name: &str) -> Result<Role, ApiError> {
        self.store
            .get_role(name)?
            .ok_or_else(|| ApiError::not_found(format!("No role found with name {}", name)))
    }

    /// Adds a role.
    pub fn add_role(&self, role: Role) -> Result<Role, ApiError> {
        let added = self.store.add_role(role)?;
        Ok(self.saved(added))
    }

    /// Replaces the role called `name`.
    pub fn update_role(&self, name: &str, role: Role) -> Result<Role, ApiError> {
        let updated = self.store.update_role(name, role)?;
        Ok(self.saved(updated))
    }

    /// Deletes a role.
    pub fn delete_role(&self, name: &str) -> Result<(), ApiError> {
        self.store.delete_role(name)?;
        self.safe_save();
        Ok(())
    }

    /// Lists the members of a role without passwords.
    pub fn get_role_members(&self, name: &str) -> Result<Vec<User>, ApiError> {
        if name.is_empty() {
            return Err(ApiError::bad_request("role name is required"));
        }
        Ok(self
            .store
            .role_members(name)?
            .into_iter()
            .map(User::without_password)
            .collect())
    }

    /// Makes a user a member of a role.
    pub fn add_user_to_role(&self, username: &str, rolename: &str) -> Result<(), ApiError> {
        check_membership_names(username, rolename)?;
        self.store.add_user_to_role(username, rolename)?;
        self.safe_save();
        Ok(())
    }

    /// Removes a user from a role.
    pub fn remove_user_from_role(&self, username: &str, rolename: &str) -> Result<(), ApiError> {
        check_membership_names(username, rolename)?;
        self.store.remove_user_from_role(username, rolename)?;
        self.safe_save();
        Ok(())
    }

    //////////////////////////////////////////////// Inputs ////////////////////////////////////////////////

    /// Lists inputs and their total.
    pub fn get_inputs(&self) -> Result<(Vec<Input>, usize), ApiError> {
        let inputs = self.store.list_inputs()?;
        let total = inputs.len();
        Ok((inputs, total))
    }

    /// Retrieves an input.
    pub fn get_input(&self, id: &str) -> Result<Input, ApiError> {
        self.store
            .get_input(id)?
            .ok_or_else(|| ApiError::not_found(format!("No input found with id {}", id)))
    }

    /// Adds an input.
    pub fn add_input(&self, input: Input) -> Result<Input, ApiError> {
        let added = self.store.add_input(input)?;
        Ok(self.saved(added))
    }

    /// Updates an input.
    pub fn update_input(&self, input: Input) -> Result<Input, ApiError> {
        let updated = self.store.update_input(input)?;
        Ok(self.saved(updated))
    }

    /// Deletes an input.
    pub fn delete_input(&self, id: &str) -> Result<(), ApiError> {
        self.store.delete_input(id)?;
        self.safe_save();
        Ok(())
    }
}

fn check_membership_names(username: &str, rolename: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::bad_request("user name is required"));
    }
    if rolename.is_empty() {
        return Err(ApiError::bad_request("role name is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDataStore;
    use axum::http::StatusCode;

    fn logic() -> Logic {
        Logic::new(Arc::new(InMemoryDataStore::new()))
    }

    #[test]
    fn authenticate_checks_password_and_strips_it() {
        let lgc = logic();
        lgc.add_user(User::new("alice", "secret")).unwrap();
        let user = lgc.authenticate("alice", "secret").unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.password.is_none());
        assert_eq!(
            lgc.authenticate("alice", "wrong").unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            lgc.authenticate("bob", "secret").unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn authorize_through_permissions_and_roles() {
        let lgc = logic();
        lgc.add_role(Role::new("editors", &["users:*"])).unwrap();

        let mut admin = User::new("admin", "admin");
        admin.permissions = vec!["*".to_string()];
        assert!(lgc.authorize(Some(&admin), "roles:edit").is_ok());

        let mut editor = User::new("editor", "pw");
        editor.roles = vec!["editors".to_string()];
        assert!(lgc.authorize(Some(&editor), "users:edit").is_ok());
        assert_eq!(
            lgc.authorize(Some(&editor), "roles:edit")
                .unwrap_err()
                .status,
            StatusCode::FORBIDDEN
        );

        assert!(lgc.authorize(None, "roles:edit").is_ok());
    }

    #[test]
    fn users_come_back_without_passwords() {
        let lgc = logic();
        let added = lgc.add_user(User::new("alice", "secret")).unwrap();
        assert!(added.password.is_none());
        assert!(lgc.get_user("alice").unwrap().password.is_none());
        assert!(lgc.get_users().unwrap().iter().all(|u| u.password.is_none()));
        assert_eq!(
            lgc.get_user_with_password("alice").unwrap().password.as_deref(),
            Some("secret")
        );
    }

    #[test]
    fn empty_membership_names_are_bad_requests() {
        let lgc = logic();
        lgc.add_role(Role::new("reader", &["users:list"])).unwrap();
        lgc.add_user(User::new("alice", "secret")).unwrap();
        assert_eq!(
            lgc.add_user_to_role("", "reader").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            lgc.add_user_to_role("alice", "").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            lgc.get_role_members("").unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            lgc.add_user_to_role("bob", "reader").unwrap_err().status,
            StatusCode::NOT_FOUND
        );
        lgc.add_user_to_role("alice", "reader").unwrap();
        assert_eq!(lgc.get_role_members("reader").unwrap().len(), 1);
    }

    #[test]
    fn missing_records_are_not_found() {
        let lgc = logic();
        for err in [
            lgc.get_index_set("x").unwrap_err(),
            lgc.get_index_set_stats("x").unwrap_err(),
            lgc.get_alert("x").unwrap_err(),
            lgc.get_user("x").unwrap_err(),
            lgc.get_role("x").unwrap_err(),
            lgc.get_input("x").unwrap_err(),
        ] {
            assert_eq!(err.status, StatusCode::NOT_FOUND);
        }
    }

    #[test]
    fn mutations_are_saved() {
        let path = std::env::temp_dir().join(format!(
            "test_logic_savefile_{}_{}.json",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let lgc = logic().with_savefile(SavefileManager::new(path.clone()));
        lgc.add_role(Role::new("reader", &["users:list"])).unwrap();

        let snapshot = SavefileManager::new(path.clone()).load().unwrap().unwrap();
        assert_eq!(snapshot.roles.len(), 1);
        std::fs::remove_file(path).unwrap();
    }
}
