//! # graylog-mock: A Graylog REST API Client and Mock Server
//!
//! This crate provides two halves of the same API surface:
//!
//! - **Client**: a typed HTTP client for the Graylog REST API covering index sets, alerts,
//!   alert conditions, users, roles, role membership and inputs
//! - **Mock server**: an in-process HTTP server that implements the same endpoints over an
//!   in-memory store, so the client (and anything built on it) can be tested without a
//!   running Graylog
//!
//! ## Architecture
//!
//! ```text
//! Client ──HTTP──> Router ──> wrap_handle (auth, extraction, rendering)
//!                                  │
//!                                  ▼
//!                         resource handlers (validate_request_body, decode_body)
//!                                  │
//!                                  ▼
//!                         Logic (authorize, status mapping, safe_save)
//!                                  │
//!                                  ▼
//!                         DataStore (invariants under per-resource locks)
//! ```
//!
//! ## Core Concepts
//!
//! ### Validation
//! Request bodies are first reconciled against required/allowed/accepted field lists and
//! only then decoded into typed records. Struct-level rules (such as the index prefix
//! pattern) are checked by the store, under the same lock that enforces cross-record
//! rules.
//!
//! ### Invariants
//! Index prefixes are unique, exactly one writable index set is the default, and role
//! membership always names existing roles. Check and mutation happen under one exclusive
//! lock, so concurrent requests cannot break these rules.
//!
//! ### Errors
//! Failures travel as [`DataStoreError`] out of the store and as [`ApiError`] (a status
//! plus a message) above it. Only the dispatch wrapper renders them, as
//! `{"type": "ApiError", "message": "..."}`.
//!
//! ## Usage Examples
//!
//! ### Logic Layer Without HTTP
//!
//! ```rust
//! use std::sync::Arc;
//! use graylog_mock::{InMemoryDataStore, Logic, Role, User};
//!
//! let lgc = Logic::new(Arc::new(InMemoryDataStore::new()));
//! lgc.add_role(Role::new("reader", &["users:list"])).unwrap();
//! lgc.add_user(User::new("alice", "secret")).unwrap();
//! lgc.add_user_to_role("alice", "reader").unwrap();
//!
//! let members = lgc.get_role_members("reader").unwrap();
//! assert_eq!(members[0].username, "alice");
//! assert!(members[0].password.is_none());
//! ```
//!
//! ### Client Against a Mock Server
//!
//! ```rust,no_run
//! use graylog_mock::{Client, MockServer, MockServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MockServer::new(MockServerConfig::default()).await?;
//! server.start();
//!
//! let client = Client::new(&server.endpoint(), "admin", "admin")?;
//! let (body, info) = client.get_index_sets(false).await?;
//! assert_eq!(info.status.map(|s| s.as_u16()), Some(200));
//! assert_eq!(body.total, 1);
//!
//! server.close().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
mod alert;
mod client;
mod config;
mod data_store;
mod errors;
mod handler;
mod id_generator;
mod index_set;
mod input;
mod logic;
mod role;
mod router;
mod savefile;
mod server;
mod user;
mod validate;

/// Command-line utilities shared by the binaries.
///
/// This module provides tracing setup and program termination helpers.
pub mod cli_utils;

pub use alert::{
    Alert, AlertCondition, AlertConditionsBody, AlertQuery, AlertsBody, DEFAULT_ALERT_LIMIT,
    LimitPolicy,
};
pub use client::{Client, ClientError, ClientResult, Endpoints, ErrorInfo};
pub use config::MockServerConfig;
pub use data_store::{DEFAULT_MUST_BE_WRITABLE, DataStore, InMemoryDataStore, Snapshot};
pub use errors::{ApiError, DataStoreError};
pub use handler::{
    API_ERROR_TYPE, ApiErrorBody, ApiRequest, FALLBACK_AUTH_BODY, FALLBACK_ERROR_BODY,
    FALLBACK_INTERNAL_BODY, HandlerResult, ResponseFuture, basic_auth, handle_not_found,
    wrap_handle,
};
pub use id_generator::{ID_LENGTH, IdGenerator};
pub use index_set::{
    DELETION_RETENTION_STRATEGY, INDEX_PREFIX_PATTERN, IndexSet, IndexSetStats, IndexSetsBody,
    MESSAGE_COUNT_ROTATION_STRATEGY, RetentionStrategy, RotationStrategy, Schema,
};
pub use input::{
    FakeHttpMessageAttrs, GelfTcpAttrs, GelfUdpAttrs, INPUT_TYPE_FAKE_HTTP_MESSAGE,
    INPUT_TYPE_GELF_TCP, INPUT_TYPE_GELF_UDP, INPUT_TYPE_SYSLOG_UDP, Input, InputAttributes,
    InputsBody, SyslogUdpAttrs,
};
pub use logic::Logic;
pub use role::{Role, RoleMembersBody, RolesBody};
pub use router::{create_api_router, create_router};
pub use savefile::{SAVEFILE_VERSION, SaveFile, SavefileManager};
pub use server::{ADMIN_ROLE, MockServer, READER_ROLE, seed_defaults};
pub use user::{User, UsersBody, WILDCARD_PERMISSION, permissions_grant};
pub use validate::{FieldValidationError, RequestBody, decode_body, validate_request_body};
