#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use serde_json::Map;

use graylog_mock::{
    Alert, Client, DELETION_RETENTION_STRATEGY, FakeHttpMessageAttrs, IndexSet, Input,
    InputAttributes, MESSAGE_COUNT_ROTATION_STRATEGY, MockServer, MockServerConfig,
    RetentionStrategy, Role, RotationStrategy, User,
};

/// Starts a seeded mock server and a client logged in as the administrator.
pub async fn get_server_and_client() -> (MockServer, Client) {
    get_server_and_client_with(MockServerConfig::default()).await
}

pub async fn get_server_and_client_with(config: MockServerConfig) -> (MockServer, Client) {
    let mut server = MockServer::new(config).await.unwrap();
    server.start();
    let client = Client::new(&server.endpoint(), "admin", "admin").unwrap();
    (server, client)
}

pub fn dummy_index_set(prefix: &str) -> IndexSet {
    IndexSet {
        id: String::new(),
        title: format!("{} index set", prefix),
        description: format!("messages prefixed with {}", prefix),
        index_prefix: prefix.to_string(),
        rotation_strategy_class: MESSAGE_COUNT_ROTATION_STRATEGY.to_string(),
        rotation_strategy: RotationStrategy::MessageCount {
            max_docs_per_index: 20_000_000,
        },
        retention_strategy_class: DELETION_RETENTION_STRATEGY.to_string(),
        retention_strategy: RetentionStrategy::Deletion {
            max_number_of_indices: 20,
        },
        creation_date: "2018-02-20T11:37:19.305Z".to_string(),
        index_analyzer: "standard".to_string(),
        shards: 4,
        replicas: 0,
        index_optimization_max_num_segments: 1,
        index_optimization_disabled: false,
        writable: true,
        default: false,
    }
}

pub fn dummy_user(username: &str) -> User {
    let mut user = User::new(username, "password");
    user.email = format!("{}@example.com", username);
    user.full_name = format!("{} user", username);
    user.permissions = vec!["users:read".to_string()];
    user
}

pub fn dummy_role(name: &str) -> Role {
    let mut role = Role::new(name, &["users:list", "roles:read"]);
    role.description = format!("{} role", name);
    role
}

pub fn dummy_alert(id: &str, triggered_secs: i64) -> Alert {
    Alert {
        id: id.to_string(),
        description: format!("Stream had {} messages in the last 1 minute", triggered_secs),
        condition_id: "56e7e2b9-b6f6-4b09-a4a6-4d5bbd5fa7fb".to_string(),
        stream_id: "000000000000000000000001".to_string(),
        triggered_at: Utc.timestamp_opt(triggered_secs, 0).unwrap(),
        resolved_at: None,
        is_interval: true,
        condition_parameters: Map::new(),
    }
}

pub fn dummy_input(title: &str) -> Input {
    Input::new(
        title,
        InputAttributes::FakeHttpMessage(FakeHttpMessageAttrs {
            sleep: 25,
            sleep_deviation: 30,
            source: "example.org".to_string(),
            ..Default::default()
        }),
    )
}
