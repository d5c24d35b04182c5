//! # Mock Server
//!
//! [`MockServer`] binds a listener, seeds or restores the store, and serves the API
//! routes on a background task until it is closed.
//!
//! ```rust,no_run
//! use graylog_mock::{Client, MockServer, MockServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MockServer::new(MockServerConfig::default()).await?;
//! server.start();
//! let client = Client::new(&server.endpoint(), "admin", "admin")?;
//! let (roles, _) = client.get_roles().await?;
//! assert!(roles.total > 0);
//! server.close().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::index_set::{DELETION_RETENTION_STRATEGY, MESSAGE_COUNT_ROTATION_STRATEGY};
use crate::{
    DataStore, DataStoreError, InMemoryDataStore, IndexSet, Logic, MockServerConfig,
    RetentionStrategy, Role, RotationStrategy, SavefileManager, User, WILDCARD_PERMISSION,
    create_router,
};

/// Name of the built-in administrator role.
pub const ADMIN_ROLE: &str = "Admin";
/// Name of the built-in read-only role.
pub const READER_ROLE: &str = "Reader";

/// An in-process Graylog API server backed by an in-memory store.
pub struct MockServer {
    logic: Arc<Logic>,
    address: SocketAddr,
    listener: Option<TcpListener>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl MockServer {
    /// Binds the listener and prepares the store.
    ///
    /// When a savefile is configured and exists, the store is restored from it;
    /// otherwise an empty store is seeded if `seed_defaults` is set.
    pub async fn new(config: MockServerConfig) -> Result<Self, std::io::Error> {
        let store = Arc::new(InMemoryDataStore::new());
        let savefile = config.savefile.clone().map(SavefileManager::new);

        let restored = match &savefile {
            Some(savefile) => match savefile.load()? {
                Some(snapshot) => {
                    store.restore(snapshot).map_err(std::io::Error::other)?;
                    tracing::info!(path = %savefile.path().display(), "restored data from savefile");
                    true
                }
                None => false,
            },
            None => false,
        };
        if !restored && config.seed_defaults {
            seed_defaults(store.as_ref(), &config).map_err(std::io::Error::other)?;
        }

        let mut logic = Logic::new(store).with_auth(config.auth_enabled);
        if let Some(savefile) = savefile {
            logic = logic.with_savefile(savefile);
        }
        if !restored {
            logic.safe_save();
        }

        let listener = TcpListener::bind(&config.bind_address).await?;
        let address = listener.local_addr()?;
        Ok(Self {
            logic: Arc::new(logic),
            address,
            listener: Some(listener),
            shutdown: None,
            task: None,
        })
    }

    /// The logic layer, for seeding records that have no HTTP endpoint.
    pub fn logic(&self) -> &Arc<Logic> {
        &self.logic
    }

    /// The bound socket address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// The API base URL, e.g. `http://127.0.0.1:4321/api`.
    pub fn endpoint(&self) -> String {
        format!("http://{}/api", self.address)
    }

    /// Starts serving on a background task. Calling it again has no effect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let (tx, rx) = oneshot::channel::<()>();
        let app = create_router(Arc::clone(&self.logic));
        self.task = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        }));
        self.shutdown = Some(tx);
        tracing::info!(endpoint = %self.endpoint(), "mock server started");
    }

    /// Stops serving and waits for in-flight requests to finish.
    pub async fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => tracing::info!(endpoint = %self.endpoint(), "mock server stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "mock server failed"),
                Err(e) => tracing::error!(error = %e, "mock server task failed"),
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Seeds an empty store with the built-in roles, the administrator and a default index
/// set.
pub fn seed_defaults(store: &dyn DataStore, config: &MockServerConfig) -> Result<(), DataStoreError> {
    let mut admin_role = Role::new(ADMIN_ROLE, &[WILDCARD_PERMISSION]);
    admin_role.description = "Grants all permissions for Graylog administrators".to_string();
    admin_role.read_only = true;
    store.add_role(admin_role)?;

    let mut reader_role = Role::new(
        READER_ROLE,
        &["indexsets:read", "inputs:read", "users:list", "roles:read"],
    );
    reader_role.description = "Grants basic permissions for every Graylog user".to_string();
    reader_role.read_only = true;
    store.add_role(reader_role)?;

    let mut admin = User::new(config.admin_username.clone(), config.admin_password.clone());
    admin.full_name = "Administrator".to_string();
    admin.email = "admin@example.com".to_string();
    admin.permissions = vec![WILDCARD_PERMISSION.to_string()];
    admin.roles = vec![ADMIN_ROLE.to_string()];
    admin.read_only = true;
    store.add_user(admin)?;

    store.add_index_set(IndexSet {
        id: String::new(),
        title: "Default index set".to_string(),
        description: "The Graylog default index set".to_string(),
        index_prefix: "graylog".to_string(),
        rotation_strategy_class: MESSAGE_COUNT_ROTATION_STRATEGY.to_string(),
        rotation_strategy: RotationStrategy::MessageCount {
            max_docs_per_index: 20_000_000,
        },
        retention_strategy_class: DELETION_RETENTION_STRATEGY.to_string(),
        retention_strategy: RetentionStrategy::Deletion {
            max_number_of_indices: 20,
        },
        creation_date: chrono::Utc::now().to_rfc3339(),
        index_analyzer: "standard".to_string(),
        shards: 4,
        replicas: 0,
        index_optimization_max_num_segments: 1,
        index_optimization_disabled: false,
        writable: true,
        default: true,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_store_has_admin_and_default_index_set() {
        let store = InMemoryDataStore::new();
        seed_defaults(&store, &MockServerConfig::default()).unwrap();

        let admin = store.get_user("admin").unwrap().unwrap();
        assert_eq!(admin.password.as_deref(), Some("admin"));
        assert!(admin.has_permission("anything"));
        assert_eq!(store.role_members(ADMIN_ROLE).unwrap().len(), 1);

        let sets = store.list_index_sets().unwrap();
        assert_eq!(sets.len(), 1);
        assert!(sets[0].default);
    }

    #[tokio::test]
    async fn endpoint_uses_bound_port() {
        let server = MockServer::new(MockServerConfig::default()).await.unwrap();
        assert_ne!(server.address().port(), 0);
        assert_eq!(
            server.endpoint(),
            format!("http://127.0.0.1:{}/api", server.address().port())
        );
    }
}
