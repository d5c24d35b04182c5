//! # Data Storage Abstraction
//!
//! This module provides the resource store behind the mock server. It defines the
//! `DataStore` trait and a thread-safe in-memory implementation holding one table per
//! resource type.
//!
//! ## Invariants
//!
//! The store is the only place where cross-record rules are enforced, and every such
//! rule is checked and applied under a single exclusive lock so that concurrent requests
//! cannot interleave between check and mutation:
//!
//! - **Index prefix uniqueness**: no two index sets share an `index_prefix`
//! - **Single default**: once a writable index set exists, exactly one writable index
//!   set is the default; setting a new default clears the old one in the same step
//! - **Role membership**: `User::roles` only names existing roles; renaming or deleting
//!   a role rewrites every member
//!
//! ## Locking
//!
//! Each resource type has its own `RwLock`. Operations that need several tables lock
//! them in one order: index sets, alerts, alert conditions, roles, users, inputs. So
//! roles always come before users. A poisoned lock is reported as
//! `DataStoreError::Internal`.
//!
//! ## Usage Examples
//!
//! ```rust
//! use graylog_mock::{DataStore, InMemoryDataStore, Role, User};
//!
//! let store = InMemoryDataStore::new();
//! store.add_role(Role::new("reader", &["users:list"])).unwrap();
//! store.add_user(User::new("alice", "secret")).unwrap();
//! store.add_user_to_role("alice", "reader").unwrap();
//!
//! let members = store.role_members("reader").unwrap();
//! assert_eq!(members.len(), 1);
//! assert_eq!(members[0].username, "alice");
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    Alert, AlertCondition, AlertQuery, DataStoreError, IdGenerator, IndexSet, IndexSetStats,
    Input, Role, Schema, User,
};

/// Message used when a non-writable index set would become the default.
pub const DEFAULT_MUST_BE_WRITABLE: &str = "Default index set must be writable.";

/// Trait defining the storage interface of the mock server.
///
/// Identifiers are assigned by the store on add. Reads return owned copies; nothing
/// handed out aliases stored state.
///
/// # Examples
///
/// ```rust
/// use graylog_mock::{DataStore, InMemoryDataStore};
/// use std::sync::Arc;
///
/// let store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
/// assert!(store.list_index_sets().unwrap().is_empty());
/// assert_eq!(store.get_user("nobody").unwrap(), None);
/// ```
pub trait DataStore: Send + Sync {
    // Index set operations

    /// Retrieves an index set by identifier.
    ///
    /// # Returns
    /// * `Ok(Some(IndexSet))` - Index set found
    /// * `Ok(None)` - No index set with this identifier
    fn get_index_set(&self, id: &str) -> Result<Option<IndexSet>, DataStoreError>;

    /// Adds an index set, assigning its identifier.
    ///
    /// A writable index set added while no default exists becomes the default.
    ///
    /// # Returns
    /// * `Ok(IndexSet)` - The stored record
    /// * `Err(DataStoreError::Validation)` - Create validation failed
    /// * `Err(DataStoreError::Conflict)` - The index prefix is taken
    /// * `Err(DataStoreError::InvalidState)` - A non-writable default was requested
    fn add_index_set(&self, index_set: IndexSet) -> Result<IndexSet, DataStoreError>;

    /// Replaces an existing index set.
    ///
    /// The default flag cannot be cleared through an update; setting it makes this the
    /// only default. A set that is writable after the update becomes the default when no
    /// other set holds it.
    ///
    /// # Returns
    /// * `Ok(IndexSet)` - The stored record
    /// * `Err(DataStoreError::NotFound)` - No index set with this identifier
    /// * `Err(DataStoreError::Validation)` - Update validation failed
    /// * `Err(DataStoreError::Conflict)` - The index prefix is taken by another index set
    /// * `Err(DataStoreError::InvalidState)` - The default would become non-writable
    fn update_index_set(&self, index_set: IndexSet) -> Result<IndexSet, DataStoreError>;

    /// Deletes an index set and its statistics.
    ///
    /// # Returns
    /// * `Err(DataStoreError::NotFound)` - No index set with this identifier
    /// * `Err(DataStoreError::Conflict)` - The index set is the default
    fn delete_index_set(&self, id: &str) -> Result<(), DataStoreError>;

    /// Lists all index sets ordered by title.
    fn list_index_sets(&self) -> Result<Vec<IndexSet>, DataStoreError>;

    /// Makes an index set the only default.
    ///
    /// # Returns
    /// * `Ok(IndexSet)` - The new default
    /// * `Err(DataStoreError::NotFound)` - No index set with this identifier
    /// * `Err(DataStoreError::InvalidState)` - The index set is not writable
    fn set_default_index_set(&self, id: &str) -> Result<IndexSet, DataStoreError>;

    /// Retrieves the statistics of one index set.
    fn index_set_stats(&self, id: &str) -> Result<Option<IndexSetStats>, DataStoreError>;

    /// Retrieves the statistics of every index set by identifier.
    fn list_index_set_stats(&self) -> Result<HashMap<String, IndexSetStats>, DataStoreError>;

    /// Sums the statistics of every index set.
    fn total_index_set_stats(&self) -> Result<IndexSetStats, DataStoreError>;

    /// Replaces the statistics of an existing index set.
    fn set_index_set_stats(&self, id: &str, stats: IndexSetStats) -> Result<(), DataStoreError>;

    // Alert operations

    /// Adds an alert, assigning an identifier when none is set.
    fn add_alert(&self, alert: Alert) -> Result<Alert, DataStoreError>;

    /// Retrieves an alert by identifier.
    fn get_alert(&self, id: &str) -> Result<Option<Alert>, DataStoreError>;

    /// Runs an alert query under the read lock.
    ///
    /// # Returns
    /// * `Ok((alerts, total))` - The page and the total reported by the query's policy
    fn query_alerts(&self, query: &AlertQuery) -> Result<(Vec<Alert>, usize), DataStoreError>;

    /// Adds an alert condition, assigning an identifier when none is set.
    fn add_alert_condition(
        &self,
        condition: AlertCondition,
    ) -> Result<AlertCondition, DataStoreError>;

    /// Retrieves an alert condition by identifier.
    fn get_alert_condition(&self, id: &str) -> Result<Option<AlertCondition>, DataStoreError>;

    /// Lists all alert conditions ordered by identifier.
    fn list_alert_conditions(&self) -> Result<Vec<AlertCondition>, DataStoreError>;

    // User operations

    /// Retrieves a user, password included.
    fn get_user(&self, username: &str) -> Result<Option<User>, DataStoreError>;

    /// Adds a user, assigning its identifier.
    ///
    /// # Returns
    /// * `Err(DataStoreError::Validation)` - Validation failed or a named role is missing
    /// * `Err(DataStoreError::Conflict)` - The user name is taken
    fn add_user(&self, user: User) -> Result<User, DataStoreError>;

    /// Replaces an existing user, keeping its identifier and, when the new record has
    /// none, its password. Read-only users are refused with `Validation`.
    fn update_user(&self, user: User) -> Result<User, DataStoreError>;

    /// Deletes a user. Read-only users are refused with `Validation`.
    fn delete_user(&self, username: &str) -> Result<(), DataStoreError>;

    /// Lists all users ordered by user name, passwords included.
    fn list_users(&self) -> Result<Vec<User>, DataStoreError>;

    // Role operations

    /// Retrieves a role by name.
    fn get_role(&self, name: &str) -> Result<Option<Role>, DataStoreError>;

    /// Adds a role.
    fn add_role(&self, role: Role) -> Result<Role, DataStoreError>;

    /// Replaces the role called `name`; a changed name is propagated to every member.
    fn update_role(&self, name: &str, role: Role) -> Result<Role, DataStoreError>;

    /// Deletes a role and removes it from every member.
    fn delete_role(&self, name: &str) -> Result<(), DataStoreError>;

    /// Lists all roles ordered by name.
    fn list_roles(&self) -> Result<Vec<Role>, DataStoreError>;

    // Membership operations

    /// Makes a user a member of a role. Adding an existing member is a no-op.
    ///
    /// # Returns
    /// * `Err(DataStoreError::NotFound)` - The role or the user does not exist
    fn add_user_to_role(&self, username: &str, rolename: &str) -> Result<(), DataStoreError>;

    /// Removes a user from a role. Removing a non-member is a no-op.
    fn remove_user_from_role(&self, username: &str, rolename: &str)
    -> Result<(), DataStoreError>;

    /// Lists the members of a role ordered by user name.
    fn role_members(&self, rolename: &str) -> Result<Vec<User>, DataStoreError>;

    // Input operations

    /// Retrieves an input by identifier.
    fn get_input(&self, id: &str) -> Result<Option<Input>, DataStoreError>;

    /// Adds an input, assigning its identifier and creation time.
    fn add_input(&self, input: Input) -> Result<Input, DataStoreError>;

    /// Replaces an existing input, keeping its creation metadata.
    fn update_input(&self, input: Input) -> Result<Input, DataStoreError>;

    /// Deletes an input.
    fn delete_input(&self, id: &str) -> Result<(), DataStoreError>;

    /// Lists all inputs ordered by title.
    fn list_inputs(&self) -> Result<Vec<Input>, DataStoreError>;

    // Existence checks

    /// Whether an index set with this identifier exists.
    fn has_index_set(&self, id: &str) -> Result<bool, DataStoreError> {
        Ok(self.get_index_set(id)?.is_some())
    }

    /// Whether an alert with this identifier exists.
    fn has_alert(&self, id: &str) -> Result<bool, DataStoreError> {
        Ok(self.get_alert(id)?.is_some())
    }

    /// Whether an alert condition with this identifier exists.
    fn has_alert_condition(&self, id: &str) -> Result<bool, DataStoreError> {
        Ok(self.get_alert_condition(id)?.is_some())
    }

    /// Whether a user with this name exists.
    fn has_user(&self, username: &str) -> Result<bool, DataStoreError> {
        Ok(self.get_user(username)?.is_some())
    }

    /// Whether a role with this name exists.
    fn has_role(&self, name: &str) -> Result<bool, DataStoreError> {
        Ok(self.get_role(name)?.is_some())
    }

    /// Whether an input with this identifier exists.
    fn has_input(&self, id: &str) -> Result<bool, DataStoreError> {
        Ok(self.get_input(id)?.is_some())
    }

    // Snapshots

    /// Copies every table.
    fn snapshot(&self) -> Result<Snapshot, DataStoreError>;

    /// Replaces every table with the contents of a snapshot.
    ///
    /// # Returns
    /// * `Err(DataStoreError::Validation)` - The snapshot breaks an invariant or repeats
    ///   a key
    /// * `Err(DataStoreError::Conflict)` - Two index sets share a prefix
    fn restore(&self, snapshot: Snapshot) -> Result<(), DataStoreError>;
}

/// A full copy of the store, as written to the savefile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Every index set.
    #[serde(default)]
    pub index_sets: Vec<IndexSet>,
    /// Index set statistics by index set identifier.
    #[serde(default)]
    pub index_set_stats: BTreeMap<String, IndexSetStats>,
    /// Every alert.
    #[serde(default)]
    pub alerts: Vec<Alert>,
    /// Every alert condition.
    #[serde(default)]
    pub alert_conditions: Vec<AlertCondition>,
    /// Every user, passwords included.
    #[serde(default)]
    pub users: Vec<User>,
    /// Every role.
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Every input.
    #[serde(default)]
    pub inputs: Vec<Input>,
}

#[derive(Debug, Default)]
struct IndexSetTable {
    sets: HashMap<String, IndexSet>,
    stats: HashMap<String, IndexSetStats>,
}

impl IndexSetTable {
    fn check_prefix(&self, index_set: &IndexSet) -> Result<(), DataStoreError> {
        let taken = self
            .sets
            .values()
            .any(|s| s.id != index_set.id && s.index_prefix == index_set.index_prefix);
        if taken {
            return Err(DataStoreError::Conflict(format!(
                "Index prefix \"{}\" would conflict with an existing index set!",
                index_set.index_prefix
            )));
        }
        Ok(())
    }

    fn make_default(&mut self, id: &str) {
        for set in self.sets.values_mut() {
            set.default = set.id == id;
        }
    }
}

/// Thread-safe in-memory implementation of the DataStore trait.
///
/// # Storage Structure
///
/// - **Index sets**: identifier -> record, plus identifier -> statistics
/// - **Alerts / alert conditions**: identifier -> record
/// - **Users**: user name -> record
/// - **Roles**: role name -> record
/// - **Inputs**: identifier -> record
pub struct InMemoryDataStore {
    ids: IdGenerator,
    index_sets: RwLock<IndexSetTable>,
    alerts: RwLock<HashMap<String, Alert>>,
    alert_conditions: RwLock<HashMap<String, AlertCondition>>,
    roles: RwLock<HashMap<String, Role>>,
    users: RwLock<HashMap<String, User>>,
    inputs: RwLock<HashMap<String, Input>>,
}

impl InMemoryDataStore {
    /// Creates a new empty in-memory data store.
    pub fn new() -> Self {
        Self::with_id_generator(IdGenerator::new())
    }

    /// Creates a new empty store drawing identifiers from `ids`.
    pub fn with_id_generator(ids: IdGenerator) -> Self {
        Self {
            ids,
            index_sets: RwLock::new(IndexSetTable::default()),
            alerts: RwLock::new(HashMap::new()),
            alert_conditions: RwLock::new(HashMap::new()),
            roles: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            inputs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, DataStoreError> {
    lock.read()
        .map_err(|_| DataStoreError::Internal("data store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, DataStoreError> {
    lock.write()
        .map_err(|_| DataStoreError::Internal("data store lock poisoned".to_string()))
}

fn index_set_not_found(id: &str) -> DataStoreError {
    DataStoreError::NotFound(format!("No indexSet found with id {}", id))
}

fn user_not_found(username: &str) -> DataStoreError {
    DataStoreError::NotFound(format!("No user found with name {}", username))
}

fn role_not_found(name: &str) -> DataStoreError {
    DataStoreError::NotFound(format!("No role found with name {}", name))
}

fn check_roles_exist(roles: &HashMap<String, Role>, user: &User) -> Result<(), DataStoreError> {
    match user.roles.iter().find(|r| !roles.contains_key(r.as_str())) {
        Some(missing) => Err(DataStoreError::Validation(format!(
            "No role found with name {}",
            missing
        ))),
        None => Ok(()),
    }
}

fn read_only_user(username: &str) -> DataStoreError {
    DataStoreError::Validation(format!("Cannot modify read only user {}", username))
}

/// Removes repeated role names, keeping the first occurrence of each.
fn dedup_roles(roles: &mut Vec<String>) {
    let mut seen = HashSet::new();
    roles.retain(|r| seen.insert(r.clone()));
}

impl DataStore for InMemoryDataStore {
    fn get_index_set(&self, id: &str) -> Result<Option<IndexSet>, DataStoreError> {
        Ok(read(&self.index_sets)?.sets.get(id).cloned())
    }

    fn add_index_set(&self, mut index_set: IndexSet) -> Result<IndexSet, DataStoreError> {
        index_set
            .validate(Schema::Create)
            .map_err(DataStoreError::Validation)?;
        let mut table = write(&self.index_sets)?;
        table.check_prefix(&index_set)?;
        if index_set.default && !index_set.writable {
            return Err(DataStoreError::InvalidState(
                DEFAULT_MUST_BE_WRITABLE.to_string(),
            ));
        }

        index_set.id = self.ids.generate_id();
        let id = index_set.id.clone();
        let has_default = table.sets.values().any(|s| s.default);
        table.sets.insert(id.clone(), index_set);
        table.stats.insert(id.clone(), IndexSetStats::default());
        let promote = match table.sets.get(&id) {
            Some(set) => set.default || (set.writable && !has_default),
            None => false,
        };
        if promote {
            table.make_default(&id);
        }
        table
            .sets
            .get(&id)
            .cloned()
            .ok_or_else(|| DataStoreError::Internal("index set vanished".to_string()))
    }

    fn update_index_set(&self, mut index_set: IndexSet) -> Result<IndexSet, DataStoreError> {
        let mut table = write(&self.index_sets)?;
        let current_default = match table.sets.get(&index_set.id) {
            Some(current) => current.default,
            None => return Err(index_set_not_found(&index_set.id)),
        };
        index_set
            .validate(Schema::Update)
            .map_err(DataStoreError::Validation)?;
        table.check_prefix(&index_set)?;

        let other_default = table
            .sets
            .values()
            .any(|s| s.default && s.id != index_set.id);
        let becomes_default =
            current_default || index_set.default || (index_set.writable && !other_default);
        if becomes_default && !index_set.writable {
            return Err(DataStoreError::InvalidState(
                DEFAULT_MUST_BE_WRITABLE.to_string(),
            ));
        }
        index_set.default = becomes_default;
        let id = index_set.id.clone();
        table.sets.insert(id.clone(), index_set.clone());
        if becomes_default && !current_default {
            table.make_default(&id);
        }
        Ok(index_set)
    }

    fn delete_index_set(&self, id: &str) -> Result<(), DataStoreError> {
        let mut table = write(&self.index_sets)?;
        match table.sets.get(id) {
            None => return Err(index_set_not_found(id)),
            Some(set) if set.default => {
                return Err(DataStoreError::Conflict(format!(
                    "Default index set <{}> cannot be deleted!",
                    id
                )));
            }
            Some(_) => {}
        }
        table.sets.remove(id);
        table.stats.remove(id);
        Ok(())
    }

    fn list_index_sets(&self) -> Result<Vec<IndexSet>, DataStoreError> {
        let mut sets: Vec<IndexSet> = read(&self.index_sets)?.sets.values().cloned().collect();
        sets.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(sets)
    }

    fn set_default_index_set(&self, id: &str) -> Result<IndexSet, DataStoreError> {
        let mut table = write(&self.index_sets)?;
        match table.sets.get(id) {
            None => return Err(index_set_not_found(id)),
            Some(set) if !set.writable => {
                return Err(DataStoreError::InvalidState(
                    DEFAULT_MUST_BE_WRITABLE.to_string(),
                ));
            }
            Some(_) => {}
        }
        table.make_default(id);
        table.sets.get(id).cloned().ok_or_else(|| index_set_not_found(id))
    }

    fn index_set_stats(&self, id: &str) -> Result<Option<IndexSetStats>, DataStoreError> {
        let table = read(&self.index_sets)?;
        if !table.sets.contains_key(id) {
            return Ok(None);
        }
        Ok(Some(table.stats.get(id).copied().unwrap_or_default()))
    }

    fn list_index_set_stats(&self) -> Result<HashMap<String, IndexSetStats>, DataStoreError> {
        let table = read(&self.index_sets)?;
        Ok(table
            .sets
            .keys()
            .map(|id| (id.clone(), table.stats.get(id).copied().unwrap_or_default()))
            .collect())
    }

    fn total_index_set_stats(&self) -> Result<IndexSetStats, DataStoreError> {
        let table = read(&self.index_sets)?;
        Ok(table
            .stats
            .values()
            .fold(IndexSetStats::default(), |acc, s| acc + *s))
    }

    fn set_index_set_stats(&self, id: &str, stats: IndexSetStats) -> Result<(), DataStoreError> {
        let mut table = write(&self.index_sets)?;
        if !table.sets.contains_key(id) {
            return Err(index_set_not_found(id));
        }
        table.stats.insert(id.to_string(), stats);
        Ok(())
    }

    fn add_alert(&self, mut alert: Alert) -> Result<Alert, DataStoreError> {
        let mut alerts = write(&self.alerts)?;
        if alert.id.is_empty() {
            alert.id = self.ids.generate_id();
        } else if alerts.contains_key(&alert.id) {
            return Err(DataStoreError::Conflict(format!(
                "Alert {} already exists",
                alert.id
            )));
        }
        alerts.insert(alert.id.clone(), alert.clone());
        Ok(alert)
    }

    fn get_alert(&self, id: &str) -> Result<Option<Alert>, DataStoreError> {
        Ok(read(&self.alerts)?.get(id).cloned())
    }

    fn query_alerts(&self, query: &AlertQuery) -> Result<(Vec<Alert>, usize), DataStoreError> {
        let alerts = read(&self.alerts)?;
        Ok(query.apply(alerts.values().cloned().collect()))
    }

    fn add_alert_condition(
        &self,
        mut condition: AlertCondition,
    ) -> Result<AlertCondition, DataStoreError> {
        if condition.condition_type.is_empty() {
            return Err(DataStoreError::Validation("type is required".to_string()));
        }
        let mut conditions = write(&self.alert_conditions)?;
        if condition.id.is_empty() {
            condition.id = self.ids.generate_id();
        } else if conditions.contains_key(&condition.id) {
            return Err(DataStoreError::Conflict(format!(
                "Alert condition {} already exists",
                condition.id
            )));
        }
        conditions.insert(condition.id.clone(), condition.clone());
        Ok(condition)
    }

    fn get_alert_condition(&self, id: &str) -> Result<Option<AlertCondition>, DataStoreError> {
        Ok(read(&self.alert_conditions)?.get(id).cloned())
    }

    fn list_alert_conditions(&self) -> Result<Vec<AlertCondition>, DataStoreError> {
        let mut conditions: Vec<AlertCondition> =
            read(&self.alert_conditions)?.values().cloned().collect();
        conditions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(conditions)
    }

    fn get_user(&self, username: &str) -> Result<Option<User>, DataStoreError> {
        Ok(read(&self.users)?.get(username).cloned())
    }

    fn add_user(&self, mut user: User) -> Result<User, DataStoreError> {
        user.validate().map_err(DataStoreError::Validation)?;
        let roles = read(&self.roles)?;
        let mut users = write(&self.users)?;
        if users.contains_key(&user.username) {
            return Err(DataStoreError::Conflict(format!(
                "User {} already exists",
                user.username
            )));
        }
        check_roles_exist(&roles, &user)?;
        dedup_roles(&mut user.roles);
        user.id = self.ids.generate_id();
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    fn update_user(&self, mut user: User) -> Result<User, DataStoreError> {
        let roles = read(&self.roles)?;
        let mut users = write(&self.users)?;
        let current = users
            .get(&user.username)
            .ok_or_else(|| user_not_found(&user.username))?;
        if current.read_only {
            return Err(read_only_user(&user.username));
        }
        user.validate().map_err(DataStoreError::Validation)?;
        check_roles_exist(&roles, &user)?;
        user.id = current.id.clone();
        if user.password.is_none() {
            user.password = current.password.clone();
        }
        dedup_roles(&mut user.roles);
        users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    fn delete_user(&self, username: &str) -> Result<(), DataStoreError> {
        let mut users = write(&self.users)?;
        match users.get(username) {
            None => Err(user_not_found(username)),
            Some(current) if current.read_only => Err(read_only_user(username)),
            Some(_) => {
                users.remove(username);
                Ok(())
            }
        }
    }

    fn list_users(&self) -> Result<Vec<User>, DataStoreError> {
        let mut users: Vec<User> = read(&self.users)?.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    fn get_role(&self, name: &str) -> Result<Option<Role>, DataStoreError> {
        Ok(read(&self.roles)?.get(name).cloned())
    }

    fn add_role(&self, role: Role) -> Result<Role, DataStoreError> {
        role.validate().map_err(DataStoreError::Validation)?;
        let mut roles = write(&self.roles)?;
        if roles.contains_key(&role.name) {
            return Err(DataStoreError::Conflict(format!(
                "Role {} already exists",
                role.name
            )));
        }
        roles.insert(role.name.clone(), role.clone());
        Ok(role)
    }

    fn update_role(&self, name: &str, role: Role) -> Result<Role, DataStoreError> {
        let mut roles = write(&self.roles)?;
        match roles.get(name) {
            None => return Err(role_not_found(name)),
            Some(current) if current.read_only => {
                return Err(DataStoreError::Validation(format!(
                    "Cannot update read only role {}",
                    name
                )));
            }
            Some(_) => {}
        }
        role.validate().map_err(DataStoreError::Validation)?;
        if role.name != name && roles.contains_key(&role.name) {
            return Err(DataStoreError::Conflict(format!(
                "Role {} already exists",
                role.name
            )));
        }

        if role.name != name {
            let mut users = write(&self.users)?;
            for user in users.values_mut() {
                for member_of in user.roles.iter_mut() {
                    if member_of == name {
                        *member_of = role.name.clone();
                    }
                }
            }
        }
        roles.remove(name);
        roles.insert(role.name.clone(), role.clone());
        Ok(role)
    }

    fn delete_role(&self, name: &str) -> Result<(), DataStoreError> {
        let mut roles = write(&self.roles)?;
        match roles.get(name) {
            None => return Err(role_not_found(name)),
            Some(current) if current.read_only => {
                return Err(DataStoreError::Validation(format!(
                    "Cannot delete read only role {}",
                    name
                )));
            }
            Some(_) => {}
        }
        let mut users = write(&self.users)?;
        for user in users.values_mut() {
            user.roles.retain(|r| r != name);
        }
        roles.remove(name);
        Ok(())
    }

    fn list_roles(&self) -> Result<Vec<Role>, DataStoreError> {
        let mut roles: Vec<Role> = read(&self.roles)?.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    fn add_user_to_role(&self, username: &str, rolename: &str) -> Result<(), DataStoreError> {
        let roles = read(&self.roles)?;
        if !roles.contains_key(rolename) {
            return Err(role_not_found(rolename));
        }
        let mut users = write(&self.users)?;
        let user = users
            .get_mut(username)
            .ok_or_else(|| user_not_found(username))?;
        if !user.roles.iter().any(|r| r == rolename) {
            user.roles.push(rolename.to_string());
        }
        Ok(())
    }

    fn remove_user_from_role(
        &self,
        username: &str,
        rolename: &str,
    ) -> Result<(), DataStoreError> {
        let roles = read(&self.roles)?;
        if !roles.contains_key(rolename) {
            return Err(role_not_found(rolename));
        }
        let mut users = write(&self.users)?;
        let user = users
            .get_mut(username)
            .ok_or_else(|| user_not_found(username))?;
        user.roles.retain(|r| r != rolename);
        Ok(())
    }

    fn role_members(&self, rolename: &str) -> Result<Vec<User>, DataStoreError> {
        let roles = read(&self.roles)?;
        if !roles.contains_key(rolename) {
            return Err(role_not_found(rolename));
        }
        let users = read(&self.users)?;
        let mut members: Vec<User> = users
            .values()
            .filter(|u| u.roles.iter().any(|r| r == rolename))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }

    fn get_input(&self, id: &str) -> Result<Option<Input>, DataStoreError> {
        Ok(read(&self.inputs)?.get(id).cloned())
    }

    fn add_input(&self, mut input: Input) -> Result<Input, DataStoreError> {
        input.validate().map_err(DataStoreError::Validation)?;
        let mut inputs = write(&self.inputs)?;
        input.id = self.ids.generate_id();
        input.created_at = Some(Utc::now());
        inputs.insert(input.id.clone(), input.clone());
        Ok(input)
    }

    fn update_input(&self, mut input: Input) -> Result<Input, DataStoreError> {
        let mut inputs = write(&self.inputs)?;
        let current = inputs
            .get(&input.id)
            .ok_or_else(|| DataStoreError::NotFound(format!("No input found with id {}", input.id)))?;
        input.validate().map_err(DataStoreError::Validation)?;
        input.created_at = current.created_at;
        input.creator_user_id = current.creator_user_id.clone();
        inputs.insert(input.id.clone(), input.clone());
        Ok(input)
    }

    fn delete_input(&self, id: &str) -> Result<(), DataStoreError> {
        match write(&self.inputs)?.remove(id) {
            Some(_) => Ok(()),
            None => Err(DataStoreError::NotFound(format!(
                "No input found with id {}",
                id
            ))),
        }
    }

    fn list_inputs(&self) -> Result<Vec<Input>, DataStoreError> {
        let mut inputs: Vec<Input> = read(&self.inputs)?.values().cloned().collect();
        inputs.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(inputs)
    }

    fn snapshot(&self) -> Result<Snapshot, DataStoreError> {
        let index_sets = read(&self.index_sets)?;
        let alerts = read(&self.alerts)?;
        let alert_conditions = read(&self.alert_conditions)?;
        let roles = read(&self.roles)?;
        let users = read(&self.users)?;
        let inputs = read(&self.inputs)?;

        let mut snapshot = Snapshot {
            index_sets: index_sets.sets.values().cloned().collect(),
            index_set_stats: index_sets
                .stats
                .iter()
                .map(|(id, stats)| (id.clone(), *stats))
                .collect(),
            alerts: alerts.values().cloned().collect(),
            alert_conditions: alert_conditions.values().cloned().collect(),
            users: users.values().cloned().collect(),
            roles: roles.values().cloned().collect(),
            inputs: inputs.values().cloned().collect(),
        };
        snapshot
            .index_sets
            .sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        snapshot.alerts.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.alert_conditions.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.users.sort_by(|a, b| a.username.cmp(&b.username));
        snapshot.roles.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
            .inputs
            .sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(snapshot)
    }

    fn restore(&self, snapshot: Snapshot) -> Result<(), DataStoreError> {
        let mut table = IndexSetTable::default();
        for set in snapshot.index_sets {
            if table.sets.contains_key(&set.id) {
                return Err(duplicate_in_snapshot("index set", &set.id));
            }
            if set.default && !set.writable {
                return Err(DataStoreError::Validation(format!(
                    "snapshot holds non-writable default index set {}",
                    set.id
                )));
            }
            table.check_prefix(&set)?;
            table.sets.insert(set.id.clone(), set);
        }
        let defaults = table.sets.values().filter(|s| s.default).count();
        let writable = table.sets.values().any(|s| s.writable);
        if defaults > 1 || (writable && defaults == 0) {
            return Err(DataStoreError::Validation(format!(
                "snapshot holds {} default index sets",
                defaults
            )));
        }
        for (id, stats) in snapshot.index_set_stats {
            if table.sets.contains_key(&id) {
                table.stats.insert(id, stats);
            }
        }
        let alerts = keyed_by(snapshot.alerts, "alert", |a| a.id.clone())?;
        let alert_conditions =
            keyed_by(snapshot.alert_conditions, "alert condition", |c| c.id.clone())?;
        let roles = keyed_by(snapshot.roles, "role", |r| r.name.clone())?;
        let users = keyed_by(snapshot.users, "user", |u| u.username.clone())?;
        for user in users.values() {
            check_roles_exist(&roles, user)?;
        }
        let inputs = keyed_by(snapshot.inputs, "input", |i| i.id.clone())?;

        let mut index_set_table = write(&self.index_sets)?;
        let mut alert_table = write(&self.alerts)?;
        let mut alert_condition_table = write(&self.alert_conditions)?;
        let mut role_table = write(&self.roles)?;
        let mut user_table = write(&self.users)?;
        let mut input_table = write(&self.inputs)?;
        *index_set_table = table;
        *alert_table = alerts;
        *alert_condition_table = alert_conditions;
        *role_table = roles;
        *user_table = users;
        *input_table = inputs;
        Ok(())
    }
}

fn duplicate_in_snapshot(kind: &str, key: &str) -> DataStoreError {
    DataStoreError::Validation(format!("snapshot holds {} {} more than once", kind, key))
}

/// Indexes snapshot records by key, refusing repeated keys.
fn keyed_by<T>(
    records: Vec<T>,
    kind: &str,
    key: impl Fn(&T) -> String,
) -> Result<HashMap<String, T>, DataStoreError> {
    let mut table = HashMap::with_capacity(records.len());
    for record in records {
        let k = key(&record);
        if table.contains_key(&k) {
            return Err(duplicate_in_snapshot(kind, &k));
        }
        table.insert(k, record);
    }
    Ok(table)
}
