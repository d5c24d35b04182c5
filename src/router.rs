use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
};

use crate::alert::{handle_get_alert, handle_get_alert_conditions, handle_get_alerts};
use crate::handler::{handle_not_found, wrap_handle};
use crate::index_set::{
    handle_create_index_set, handle_delete_index_set, handle_get_all_index_sets_stats,
    handle_get_index_set, handle_get_index_set_stats, handle_get_index_sets,
    handle_set_default_index_set, handle_update_index_set,
};
use crate::input::{
    handle_create_input, handle_delete_input, handle_get_input, handle_get_inputs,
    handle_update_input,
};
use crate::role::{
    handle_add_user_to_role, handle_create_role, handle_delete_role, handle_get_role,
    handle_get_role_members, handle_get_roles, handle_remove_user_from_role, handle_update_role,
};
use crate::user::{
    handle_create_user, handle_delete_user, handle_get_user, handle_get_users, handle_update_user,
};
use crate::Logic;

/// Builds the API routes, without the `/api` prefix.
pub fn create_api_router(lgc: Arc<Logic>) -> Router {
    Router::new()
        .route(
            "/system/indices/index_sets",
            get(wrap_handle(handle_get_index_sets)).post(wrap_handle(handle_create_index_set)),
        )
        .route(
            "/system/indices/index_sets/stats",
            get(wrap_handle(handle_get_all_index_sets_stats)),
        )
        .route(
            "/system/indices/index_sets/:index_set_id",
            get(wrap_handle(handle_get_index_set))
                .put(wrap_handle(handle_update_index_set))
                .delete(wrap_handle(handle_delete_index_set)),
        )
        .route(
            "/system/indices/index_sets/:index_set_id/stats",
            get(wrap_handle(handle_get_index_set_stats)),
        )
        .route(
            "/system/indices/index_sets/:index_set_id/default",
            put(wrap_handle(handle_set_default_index_set)),
        )
        .route("/streams/alerts", get(wrap_handle(handle_get_alerts)))
        .route("/streams/alerts/:alert_id", get(wrap_handle(handle_get_alert)))
        .route(
            "/alerts/conditions",
            get(wrap_handle(handle_get_alert_conditions)),
        )
        .route(
            "/users",
            get(wrap_handle(handle_get_users)).post(wrap_handle(handle_create_user)),
        )
        .route(
            "/users/:username",
            get(wrap_handle(handle_get_user))
                .put(wrap_handle(handle_update_user))
                .delete(wrap_handle(handle_delete_user)),
        )
        .route(
            "/roles",
            get(wrap_handle(handle_get_roles)).post(wrap_handle(handle_create_role)),
        )
        .route(
            "/roles/:rolename",
            get(wrap_handle(handle_get_role))
                .put(wrap_handle(handle_update_role))
                .delete(wrap_handle(handle_delete_role)),
        )
        .route(
            "/roles/:rolename/members",
            get(wrap_handle(handle_get_role_members)),
        )
        .route(
            "/roles/:rolename/members/:username",
            put(wrap_handle(handle_add_user_to_role))
                .delete(wrap_handle(handle_remove_user_from_role)),
        )
        .route(
            "/system/inputs",
            get(wrap_handle(handle_get_inputs)).post(wrap_handle(handle_create_input)),
        )
        .route(
            "/system/inputs/:input_id",
            get(wrap_handle(handle_get_input))
                .put(wrap_handle(handle_update_input))
                .delete(wrap_handle(handle_delete_input)),
        )
        .with_state(lgc)
}

/// Builds the full application: the API mounted under `/api` and a JSON 404 fallback.
pub fn create_router(lgc: Arc<Logic>) -> Router {
    Router::new()
        .nest("/api", create_api_router(lgc))
        .fallback(handle_not_found)
}
