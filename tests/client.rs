mod common;

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::StatusCode;
use serde_json::Map;

use graylog_mock::{
    API_ERROR_TYPE, AlertCondition, Client, ClientError, DataStore, IndexSetStats, InputAttributes,
    MockServerConfig, Role,
};

use common::{
    dummy_alert, dummy_index_set, dummy_input, dummy_role, dummy_user, get_server_and_client,
    get_server_and_client_with,
};

fn api_error(err: &ClientError) -> (StatusCode, String) {
    match err {
        ClientError::Api { info } => (
            info.status.unwrap(),
            info.message.clone().unwrap_or_default(),
        ),
        other => panic!("expected an API error, got {}", other),
    }
}

//////////////////////////////////////////////// Index sets ////////////////////////////////////////////////

#[tokio::test]
async fn index_set_crud() {
    let (mut server, client) = get_server_and_client().await;

    let (created, info) = client
        .create_index_set(&dummy_index_set("hoge"))
        .await
        .unwrap();
    assert_eq!(info.status, Some(StatusCode::OK));
    assert!(!created.id.is_empty());
    assert!(!created.default, "the seeded index set stays the default");

    let (fetched, _) = client.get_index_set(&created.id).await.unwrap();
    assert_eq!(fetched, created);

    let mut changed = fetched.clone();
    changed.title = "renamed".to_string();
    let (updated, _) = client.update_index_set(&changed).await.unwrap();
    assert_eq!(updated.title, "renamed");
    assert_eq!(updated.id, created.id);

    let (body, _) = client.get_index_sets(false).await.unwrap();
    assert_eq!(body.total, 2);
    assert!(body.stats.is_empty());

    client.delete_index_set(&created.id).await.unwrap();
    let err = client.get_index_set(&created.id).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.close().await;
}

#[tokio::test]
async fn set_default_index_set_moves_the_flag() {
    let (mut server, client) = get_server_and_client().await;

    let (sets, _) = client.get_index_sets(false).await.unwrap();
    let seeded = sets.index_sets.iter().find(|s| s.default).unwrap().clone();
    let (created, _) = client
        .create_index_set(&dummy_index_set("fuga"))
        .await
        .unwrap();

    let (now_default, _) = client.set_default_index_set(&created.id).await.unwrap();
    assert!(now_default.default);
    let (old, _) = client.get_index_set(&seeded.id).await.unwrap();
    assert!(!old.default);

    let err = client.delete_index_set(&created.id).await.unwrap_err();
    let (status, message) = api_error(&err);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(message.contains("cannot be deleted"), "{}", message);
    assert_eq!(err.info().unwrap().error_type.as_deref(), Some(API_ERROR_TYPE));

    client.delete_index_set(&seeded.id).await.unwrap();
    let (sets, _) = client.get_index_sets(false).await.unwrap();
    assert_eq!(sets.total, 1);
    assert_eq!(sets.index_sets.iter().filter(|s| s.default).count(), 1);

    server.close().await;
}

#[tokio::test]
async fn index_prefix_conflict_is_rejected() {
    let (mut server, client) = get_server_and_client().await;

    client
        .create_index_set(&dummy_index_set("piyo"))
        .await
        .unwrap();
    let err = client
        .create_index_set(&dummy_index_set("piyo"))
        .await
        .unwrap_err();
    let (status, message) = api_error(&err);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        message,
        r#"Index prefix "piyo" would conflict with an existing index set!"#
    );

    let mut bad = dummy_index_set("Upper");
    bad.title = "bad prefix".to_string();
    let err = client.create_index_set(&bad).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    server.close().await;
}

#[tokio::test]
async fn non_writable_index_set_cannot_be_default() {
    let (mut server, client) = get_server_and_client().await;

    let mut read_only = dummy_index_set("archive");
    read_only.writable = false;
    let (created, _) = client.create_index_set(&read_only).await.unwrap();
    assert!(!created.default);

    let err = client.set_default_index_set(&created.id).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));

    server.close().await;
}

#[tokio::test]
async fn index_set_stats() {
    let (mut server, client) = get_server_and_client().await;

    let (created, _) = client
        .create_index_set(&dummy_index_set("stats"))
        .await
        .unwrap();
    let stats = IndexSetStats {
        indices: 2,
        documents: 100,
        size: 4096,
    };
    server
        .logic()
        .store()
        .set_index_set_stats(&created.id, stats)
        .unwrap();

    let (one, _) = client.get_index_set_stats(&created.id).await.unwrap();
    assert_eq!(one, stats);
    let (all, _) = client.get_all_index_sets_stats().await.unwrap();
    assert_eq!(all, stats);

    let (body, _) = client.get_index_sets(true).await.unwrap();
    assert_eq!(body.stats.len(), 2);
    assert_eq!(body.stats[&created.id], stats);

    let err = client.get_index_set_stats("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.close().await;
}

////////////////////////////////////////////////// Alerts //////////////////////////////////////////////////

#[tokio::test]
async fn get_alerts_clamps_the_limit() {
    let (mut server, client) = get_server_and_client().await;

    let (empty, _) = client.get_alerts(0, 1).await.unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.alerts.is_empty());

    for (id, secs) in [("a", 100), ("b", 300), ("c", 200)] {
        server.logic().add_alert(dummy_alert(id, secs)).unwrap();
    }

    let (page, _) = client.get_alerts(0, 2).await.unwrap();
    let ids: Vec<&str> = page.alerts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    assert_eq!(page.total, 2);

    let (all, _) = client.get_alerts(0, 100).await.unwrap();
    assert_eq!(all.alerts.len(), 3);
    assert_eq!(all.total, 3);

    let (skipped, _) = client.get_alerts(2, 100).await.unwrap();
    assert_eq!(skipped.alerts[0].id, "a");

    let (alert, _) = client.get_alert("c").await.unwrap();
    assert_eq!(alert.triggered_at.timestamp(), 200);
    let err = client.get_alert("zzz").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.close().await;
}

#[tokio::test]
async fn get_alert_conditions() {
    let (mut server, client) = get_server_and_client().await;

    server
        .logic()
        .add_alert_condition(AlertCondition {
            id: String::new(),
            condition_type: "message_count".to_string(),
            title: "too many messages".to_string(),
            creator_user_id: "admin".to_string(),
            created_at: None,
            parameters: Map::new(),
            in_grace: false,
        })
        .unwrap();

    let (body, _) = client.get_alert_conditions().await.unwrap();
    assert_eq!(body.total, 1);
    assert_eq!(body.conditions[0].condition_type, "message_count");
    assert!(!body.conditions[0].id.is_empty());

    server.close().await;
}

/////////////////////////////////////////////////// Users //////////////////////////////////////////////////

#[tokio::test]
async fn user_crud() {
    let (mut server, client) = get_server_and_client().await;

    let (_, info) = client.create_user(&dummy_user("foo")).await.unwrap();
    assert_eq!(info.status, Some(StatusCode::OK));
    assert!(info.response_body.is_empty());

    let (user, _) = client.get_user("foo").await.unwrap();
    assert_eq!(user.email, "foo@example.com");
    assert!(user.password.is_none());
    assert!(!user.id.is_empty());

    let mut changed = user.clone();
    changed.email = "bar@example.com".to_string();
    client.update_user(&changed).await.unwrap();
    let (user, _) = client.get_user("foo").await.unwrap();
    assert_eq!(user.email, "bar@example.com");

    let (body, _) = client.get_users().await.unwrap();
    assert_eq!(body.users.len(), 2);
    assert!(body.users.iter().all(|u| u.password.is_none()));

    let err = client.create_user(&dummy_user("foo")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    client.delete_user("foo").await.unwrap();
    let err = client.get_user("foo").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.close().await;
}

#[tokio::test]
async fn updated_password_is_used_for_authentication() {
    let (mut server, client) = get_server_and_client().await;

    client.create_user(&dummy_user("foo")).await.unwrap();
    let foo = Client::new(&server.endpoint(), "foo", "password").unwrap();
    foo.get_users().await.unwrap();

    let (mut user, _) = client.get_user("foo").await.unwrap();
    user.password = Some("changed".to_string());
    client.update_user(&user).await.unwrap();

    let err = foo.get_users().await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    let foo = Client::new(&server.endpoint(), "foo", "changed").unwrap();
    foo.get_users().await.unwrap();

    server.close().await;
}

/////////////////////////////////////////////////// Roles //////////////////////////////////////////////////

#[tokio::test]
async fn role_crud() {
    let (mut server, client) = get_server_and_client().await;

    let (created, _) = client.create_role(&dummy_role("writer")).await.unwrap();
    assert_eq!(created.name, "writer");

    let (fetched, _) = client.get_role("writer").await.unwrap();
    assert_eq!(fetched, created);

    let mut renamed = fetched.clone();
    renamed.name = "editor".to_string();
    renamed.permissions.push("users:edit".to_string());
    let (updated, _) = client.update_role("writer", &renamed).await.unwrap();
    assert_eq!(updated.permissions.len(), 3);

    let err = client.get_role("writer").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    let (roles, _) = client.get_roles().await.unwrap();
    assert_eq!(roles.total, roles.roles.len());
    assert!(roles.roles.iter().any(|r| r.name == "editor"));

    client.delete_role("editor").await.unwrap();
    let err = client.delete_role("editor").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.close().await;
}

#[tokio::test]
async fn built_in_roles_are_read_only() {
    let (mut server, client) = get_server_and_client().await;

    let err = client.delete_role("Admin").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    let err = client
        .update_role("Reader", &Role::new("Reader", &["*"]))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    server.close().await;
}

#[tokio::test]
async fn built_in_admin_user_is_read_only() {
    let (mut server, client) = get_server_and_client().await;

    let err = client.delete_user("admin").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    let (mut admin, _) = client.get_user("admin").await.unwrap();
    admin.full_name = "Someone Else".to_string();
    let err = client.update_user(&admin).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    let (admin, _) = client.get_user("admin").await.unwrap();
    assert_ne!(admin.full_name, "Someone Else");

    server.close().await;
}

#[tokio::test]
async fn get_role_members() {
    let (mut server, client) = get_server_and_client().await;

    client.create_role(&dummy_role("writer")).await.unwrap();
    let mut user = dummy_user("foo");
    user.roles = vec!["writer".to_string()];
    client.create_user(&user).await.unwrap();

    let (members, _) = client.get_role_members("writer").await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].username, "foo");
    assert!(members[0].password.is_none());

    assert!(matches!(
        client.get_role_members("").await,
        Err(ClientError::InvalidArgument(_))
    ));
    let err = client.get_role_members("h").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.close().await;
}

#[tokio::test]
async fn add_and_remove_user_from_role() {
    let (mut server, client) = get_server_and_client().await;

    client.create_role(&dummy_role("writer")).await.unwrap();
    client.create_user(&dummy_user("foo")).await.unwrap();

    client.add_user_to_role("foo", "writer").await.unwrap();
    let (user, _) = client.get_user("foo").await.unwrap();
    assert_eq!(user.roles, vec!["writer".to_string()]);

    assert!(matches!(
        client.add_user_to_role("", "writer").await,
        Err(ClientError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.add_user_to_role("foo", "").await,
        Err(ClientError::InvalidArgument(_))
    ));
    let err = client.add_user_to_role("foo", "nobody").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    client.remove_user_from_role("foo", "writer").await.unwrap();
    let (members, _) = client.get_role_members("writer").await.unwrap();
    assert!(members.is_empty());

    server.close().await;
}

#[tokio::test]
async fn deleting_a_role_removes_it_from_members() {
    let (mut server, client) = get_server_and_client().await;

    client.create_role(&dummy_role("writer")).await.unwrap();
    let mut user = dummy_user("foo");
    user.roles = vec!["writer".to_string()];
    client.create_user(&user).await.unwrap();

    client.delete_role("writer").await.unwrap();
    let (user, _) = client.get_user("foo").await.unwrap();
    assert!(user.roles.is_empty());

    server.close().await;
}

////////////////////////////////////////////////// Inputs //////////////////////////////////////////////////

#[tokio::test]
async fn input_crud() {
    let (mut server, client) = get_server_and_client().await;

    let (created, _) = client.create_input(&dummy_input("fake")).await.unwrap();
    assert!(!created.id.is_empty());
    assert!(created.created_at.is_some());
    assert_eq!(created.creator_user_id.as_deref(), Some("admin"));

    let (fetched, _) = client.get_input(&created.id).await.unwrap();
    assert_eq!(fetched, created);

    let mut changed = fetched.clone();
    changed.title = "renamed".to_string();
    if let InputAttributes::FakeHttpMessage(attrs) = &mut changed.attributes {
        attrs.sleep = 50;
    }
    let (updated, _) = client.update_input(&changed).await.unwrap();
    assert_eq!(updated.title, "renamed");
    match &updated.attributes {
        InputAttributes::FakeHttpMessage(attrs) => assert_eq!(attrs.sleep, 50),
        other => panic!("unexpected attributes: {:?}", other),
    }

    let (body, _) = client.get_inputs().await.unwrap();
    assert_eq!(body.total, 1);

    client.delete_input(&created.id).await.unwrap();
    let err = client.get_input(&created.id).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    server.close().await;
}

#[tokio::test]
async fn local_input_requires_a_node() {
    let (mut server, client) = get_server_and_client().await;

    let mut input = dummy_input("local");
    input.global = false;
    let err = client.create_input(&input).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    input.node = Some("2ad6b340-3e5f-4a96-ae81-040cfb8b6024".to_string());
    client.create_input(&input).await.unwrap();

    server.close().await;
}

/////////////////////////////////////////////// Authentication /////////////////////////////////////////////

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let (mut server, _client) = get_server_and_client().await;

    let client = Client::new(&server.endpoint(), "admin", "wrong").unwrap();
    let err = client.get_roles().await.unwrap_err();
    let info = err.info().unwrap();
    assert_eq!(info.status, Some(StatusCode::UNAUTHORIZED));
    assert!(info.response_body.is_empty());

    server.close().await;
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let (mut server, client) = get_server_and_client().await;

    client.create_user(&dummy_user("foo")).await.unwrap();
    let foo = Client::new(&server.endpoint(), "foo", "password").unwrap();
    let err = foo.create_role(&dummy_role("writer")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    foo.get_roles().await.unwrap();

    server.close().await;
}

#[tokio::test]
async fn auth_can_be_disabled() {
    let (mut server, _client) =
        get_server_and_client_with(MockServerConfig::default().with_auth(false)).await;

    let client = Client::new(&server.endpoint(), "nobody", "nothing").unwrap();
    client.create_role(&dummy_role("writer")).await.unwrap();
    let (roles, _) = client.get_roles().await.unwrap();
    assert!(roles.roles.iter().any(|r| r.name == "writer"));

    server.close().await;
}

#[tokio::test]
async fn invalid_endpoint_is_rejected() {
    assert!(matches!(
        Client::new("not a url", "admin", "admin"),
        Err(ClientError::InvalidEndpoint(_))
    ));
}

///////////////////////////////////////////////// Savefile /////////////////////////////////////////////////

#[tokio::test]
async fn state_survives_a_restart_with_a_savefile() {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!(
        "graylog_mock_restart_{}_{}.json",
        process::id(),
        timestamp
    ));
    let config = MockServerConfig::default().with_savefile(PathBuf::from(&path));

    let (mut server, client) = get_server_and_client_with(config.clone()).await;
    client.create_role(&dummy_role("writer")).await.unwrap();
    let (created, _) = client
        .create_index_set(&dummy_index_set("kept"))
        .await
        .unwrap();
    server.close().await;
    drop(server);

    let (mut server, client) = get_server_and_client_with(config).await;
    client.get_role("writer").await.unwrap();
    let (fetched, _) = client.get_index_set(&created.id).await.unwrap();
    assert_eq!(fetched.index_prefix, "kept");
    client.get_user("admin").await.unwrap();
    server.close().await;

    let _ = fs::remove_file(&path);
}
