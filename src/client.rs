//! # API Client
//!
//! [`Client`] speaks the Graylog REST API over HTTP with basic authentication. Every
//! call returns an [`ErrorInfo`] describing the exchange (method, URL, status, raw body)
//! alongside the decoded value, and every failure carries the same information so that
//! callers can inspect the status code and body of a rejected request.

use std::fmt;

use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    Alert, AlertConditionsBody, AlertsBody, ApiErrorBody, IndexSet, IndexSetStats,
    IndexSetsBody, Input, InputsBody, Role, RoleMembersBody, RolesBody, User, UsersBody,
};
use crate::role::RoleRequest;

/// The metadata of one request/response exchange.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// Request method.
    pub method: Method,
    /// Request URL.
    pub url: Url,
    /// Response status, if a response arrived.
    pub status: Option<StatusCode>,
    /// Raw response body.
    pub response_body: Vec<u8>,
    /// `message` of a JSON error body.
    pub message: Option<String>,
    /// `type` of a JSON error body.
    pub error_type: Option<String>,
}

impl ErrorInfo {
    fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            status: None,
            response_body: Vec::new(),
            message: None,
            error_type: None,
        }
    }

    /// The response body as text.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.response_body).into_owned()
    }
}

/// Errors returned by [`Client`] calls.
#[derive(Debug)]
pub enum ClientError {
    /// The endpoint URL cannot be used as an API base.
    InvalidEndpoint(String),
    /// A required argument was empty; no request was sent.
    InvalidArgument(String),
    /// The request body could not be encoded.
    Encode(String),
    /// The request could not be sent or the response could not be read.
    Transport {
        /// The exchange so far.
        info: Box<ErrorInfo>,
        /// The transport error.
        source: reqwest::Error,
    },
    /// The server answered with an error status.
    Api {
        /// The exchange, including the decoded error body.
        info: Box<ErrorInfo>,
    },
    /// The response body could not be decoded.
    Decode {
        /// The exchange.
        info: Box<ErrorInfo>,
        /// The decoder's error message.
        reason: String,
    },
}

impl ClientError {
    /// The exchange metadata, when a request was sent.
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Transport { info, .. } | Self::Api { info } | Self::Decode { info, .. } => {
                Some(info)
            }
            Self::InvalidEndpoint(_) | Self::InvalidArgument(_) | Self::Encode(_) => None,
        }
    }

    /// The response status, when a response arrived.
    pub fn status(&self) -> Option<StatusCode> {
        self.info().and_then(|info| info.status)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEndpoint(msg) => write!(f, "invalid endpoint: {}", msg),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::Encode(msg) => write!(f, "failed to encode request body: {}", msg),
            Self::Transport { info, source } => {
                write!(f, "{} {}: {}", info.method, info.url, source)
            }
            Self::Api { info } => {
                let status = info.status.map(|s| s.to_string()).unwrap_or_default();
                match &info.message {
                    Some(message) => write!(f, "{} {}: {}", status, info.url, message),
                    None => write!(f, "{} {}", status, info.url),
                }
            }
            Self::Decode { info, reason } => write!(
                f,
                "failed to decode the response of {} {}: {} (body: {})",
                info.method,
                info.url,
                reason,
                info.body_text()
            ),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result of a client call: the decoded value and the exchange metadata.
pub type ClientResult<T> = Result<(T, ErrorInfo), ClientError>;

/// URLs of every API resource under one base.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Parses an API base such as `http://localhost:9000/api`.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        let base =
            Url::parse(endpoint).map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidEndpoint(format!(
                "{} cannot be a base URL",
                endpoint
            )));
        }
        Ok(Self { base })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `/system/indices/index_sets`
    pub fn index_sets(&self) -> Url {
        self.url(&["system", "indices", "index_sets"])
    }

    /// `/system/indices/index_sets/{id}`
    pub fn index_set(&self, id: &str) -> Url {
        self.url(&["system", "indices", "index_sets", id])
    }

    /// `/system/indices/index_sets/stats`
    pub fn index_sets_stats(&self) -> Url {
        self.url(&["system", "indices", "index_sets", "stats"])
    }

    /// `/system/indices/index_sets/{id}/stats`
    pub fn index_set_stats(&self, id: &str) -> Url {
        self.url(&["system", "indices", "index_sets", id, "stats"])
    }

    /// `/system/indices/index_sets/{id}/default`
    pub fn set_default_index_set(&self, id: &str) -> Url {
        self.url(&["system", "indices", "index_sets", id, "default"])
    }

    /// `/streams/alerts`
    pub fn alerts(&self) -> Url {
        self.url(&["streams", "alerts"])
    }

    /// `/streams/alerts/{id}`
    pub fn alert(&self, id: &str) -> Url {
        self.url(&["streams", "alerts", id])
    }

    /// `/alerts/conditions`
    pub fn alert_conditions(&self) -> Url {
        self.url(&["alerts", "conditions"])
    }

    /// `/users`
    pub fn users(&self) -> Url {
        self.url(&["users"])
    }

    /// `/users/{username}`
    pub fn user(&self, username: &str) -> Url {
        self.url(&["users", username])
    }

    /// `/roles`
    pub fn roles(&self) -> Url {
        self.url(&["roles"])
    }

    /// `/roles/{rolename}`
    pub fn role(&self, name: &str) -> Url {
        self.url(&["roles", name])
    }

    /// `/roles/{rolename}/members`
    pub fn role_members(&self, name: &str) -> Url {
        self.url(&["roles", name, "members"])
    }

    /// `/roles/{rolename}/members/{username}`
    pub fn role_member(&self, rolename: &str, username: &str) -> Url {
        self.url(&["roles", rolename, "members", username])
    }

    /// `/system/inputs`
    pub fn inputs(&self) -> Url {
        self.url(&["system", "inputs"])
    }

    /// `/system/inputs/{id}`
    pub fn input(&self, id: &str) -> Url {
        self.url(&["system", "inputs", id])
    }
}

/// A Graylog REST API client.
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    endpoints: Endpoints,
    name: String,
    password: String,
}

fn require(name: &str, value: &str) -> Result<(), ClientError> {
    if value.is_empty() {
        return Err(ClientError::InvalidArgument(format!("{} is required", name)));
    }
    Ok(())
}

impl Client {
    /// Creates a client for the API at `endpoint` authenticating as `name`.
    pub fn new(
        endpoint: &str,
        name: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: reqwest::Client::new(),
            endpoints: Endpoints::new(endpoint)?,
            name: name.into(),
            password: password.into(),
        })
    }

    /// The resource URLs.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The user name sent with every request.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends one request and reads the whole response.
    ///
    /// Error statuses are turned into [`ClientError::Api`] with the decoded error body.
    async fn call_req(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<ErrorInfo, ClientError> {
        let mut info = ErrorInfo::new(method.clone(), url.clone());
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.name, Some(&self.password))
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => {
                return Err(ClientError::Transport {
                    info: Box::new(info),
                    source,
                });
            }
        };
        let status = response.status();
        info.status = Some(status);
        match response.bytes().await {
            Ok(bytes) => info.response_body = bytes.to_vec(),
            Err(source) => {
                return Err(ClientError::Transport {
                    info: Box::new(info),
                    source,
                });
            }
        }
        tracing::debug!(method = %info.method, url = %info.url, status = status.as_u16(), "api call");

        if status.is_client_error() || status.is_server_error() {
            if info.response_body.is_empty() {
                info.message = status.canonical_reason().map(str::to_string);
                return Err(ClientError::Api {
                    info: Box::new(info),
                });
            }
            return match serde_json::from_slice::<ApiErrorBody>(&info.response_body) {
                Ok(body) => {
                    info.message = Some(body.message);
                    info.error_type = Some(body.kind);
                    Err(ClientError::Api {
                        info: Box::new(info),
                    })
                }
                Err(e) => Err(ClientError::Decode {
                    info: Box::new(info),
                    reason: format!("failed to parse response body as an error: {}", e),
                }),
            };
        }
        Ok(info)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> ClientResult<T> {
        let info = self.call_req(method, url, body).await?;
        match serde_json::from_slice(&info.response_body) {
            Ok(value) => Ok((value, info)),
            Err(e) => Err(ClientError::Decode {
                info: Box::new(info),
                reason: e.to_string(),
            }),
        }
    }

    async fn call_empty(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> ClientResult<()> {
        let info = self.call_req(method, url, body).await?;
        Ok(((), info))
    }

    fn encode<B: Serialize>(body: &B) -> Result<Option<Vec<u8>>, ClientError> {
        serde_json::to_vec(body)
            .map(Some)
            .map_err(|e| ClientError::Encode(e.to_string()))
    }

    ////////////////////////////////////////////// Index sets //////////////////////////////////////////////

    /// Lists index sets, with per index set statistics when `with_stats` is set.
    pub async fn get_index_sets(&self, with_stats: bool) -> ClientResult<IndexSetsBody> {
        let mut url = self.endpoints.index_sets();
        if with_stats {
            url.query_pairs_mut().append_pair("stats", "true");
        }
        self.call(Method::GET, url, None).await
    }

    /// Retrieves an index set.
    pub async fn get_index_set(&self, id: &str) -> ClientResult<IndexSet> {
        require("id", id)?;
        self.call(Method::GET, self.endpoints.index_set(id), None).await
    }

    /// Creates an index set; the returned record carries the assigned identifier.
    pub async fn create_index_set(&self, index_set: &IndexSet) -> ClientResult<IndexSet> {
        let body = Self::encode(index_set)?;
        self.call(Method::POST, self.endpoints.index_sets(), body).await
    }

    /// Updates an index set identified by its `id`.
    pub async fn update_index_set(&self, index_set: &IndexSet) -> ClientResult<IndexSet> {
        require("id", &index_set.id)?;
        let body = Self::encode(index_set)?;
        self.call(Method::PUT, self.endpoints.index_set(&index_set.id), body)
            .await
    }

    /// Deletes an index set.
    pub async fn delete_index_set(&self, id: &str) -> ClientResult<()> {
        require("id", id)?;
        self.call_empty(Method::DELETE, self.endpoints.index_set(id), None)
            .await
    }

    /// Makes an index set the default.
    pub async fn set_default_index_set(&self, id: &str) -> ClientResult<IndexSet> {
        require("id", id)?;
        self.call(Method::PUT, self.endpoints.set_default_index_set(id), None)
            .await
    }

    /// Retrieves the statistics of an index set.
    pub async fn get_index_set_stats(&self, id: &str) -> ClientResult<IndexSetStats> {
        require("id", id)?;
        self.call(Method::GET, self.endpoints.index_set_stats(id), None)
            .await
    }

    /// Retrieves the summed statistics of all index sets.
    pub async fn get_all_index_sets_stats(&self) -> ClientResult<IndexSetStats> {
        self.call(Method::GET, self.endpoints.index_sets_stats(), None)
            .await
    }

    //////////////////////////////////////////////// Alerts ////////////////////////////////////////////////

    /// Lists alerts newest first.
    pub async fn get_alerts(&self, skip: usize, limit: usize) -> ClientResult<AlertsBody> {
        let mut url = self.endpoints.alerts();
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("limit", &limit.to_string());
        self.call(Method::GET, url, None).await
    }

    /// Retrieves an alert.
    pub async fn get_alert(&self, id: &str) -> ClientResult<Alert> {
        require("id", id)?;
        self.call(Method::GET, self.endpoints.alert(id), None).await
    }

    /// Lists alert conditions.
    pub async fn get_alert_conditions(&self) -> ClientResult<AlertConditionsBody> {
        self.call(Method::GET, self.endpoints.alert_conditions(), None)
            .await
    }

    //////////////////////////////////////////////// Users /////////////////////////////////////////////////

    /// Lists users.
    pub async fn get_users(&self) -> ClientResult<UsersBody> {
        self.call(Method::GET, self.endpoints.users(), None).await
    }

    /// Retrieves a user.
    pub async fn get_user(&self, username: &str) -> ClientResult<User> {
        require("username", username)?;
        self.call(Method::GET, self.endpoints.user(username), None).await
    }

    /// Creates a user.
    pub async fn create_user(&self, user: &User) -> ClientResult<()> {
        require("username", &user.username)?;
        let body = Self::encode(user)?;
        self.call_empty(Method::POST, self.endpoints.users(), body).await
    }

    /// Updates a user identified by its `username`.
    pub async fn update_user(&self, user: &User) -> ClientResult<()> {
        require("username", &user.username)?;
        let body = Self::encode(user)?;
        self.call_empty(Method::PUT, self.endpoints.user(&user.username), body)
            .await
    }

    /// Deletes a user.
    pub async fn delete_user(&self, username: &str) -> ClientResult<()> {
        require("username", username)?;
        self.call_empty(Method::DELETE, self.endpoints.user(username), None)
            .await
    }

    //////////////////////////////////////////////// Roles /////////////////////////////////////////////////

    /// Lists roles.
    pub async fn get_roles(&self) -> ClientResult<RolesBody> {
        self.call(Method::GET, self.endpoints.roles(), None).await
    }

    /// Retrieves a role.
    pub async fn get_role(&self, name: &str) -> ClientResult<Role> {
        require("name", name)?;
        self.call(Method::GET, self.endpoints.role(name), None).await
    }

    /// Creates a role.
    pub async fn create_role(&self, role: &Role) -> ClientResult<Role> {
        let body = Self::encode(&RoleRequest::from(role))?;
        self.call(Method::POST, self.endpoints.roles(), body).await
    }

    /// Replaces the role called `name` with `role`.
    pub async fn update_role(&self, name: &str, role: &Role) -> ClientResult<Role> {
        require("name", name)?;
        let body = Self::encode(&RoleRequest::from(role))?;
        self.call(Method::PUT, self.endpoints.role(name), body).await
    }

    /// Deletes a role.
    pub async fn delete_role(&self, name: &str) -> ClientResult<()> {
        require("name", name)?;
        self.call_empty(Method::DELETE, self.endpoints.role(name), None)
            .await
    }

    /// Lists the members of a role.
    pub async fn get_role_members(&self, name: &str) -> ClientResult<Vec<User>> {
        require("name", name)?;
        let (body, info): (RoleMembersBody, ErrorInfo) = self
            .call(Method::GET, self.endpoints.role_members(name), None)
            .await?;
        Ok((body.users, info))
    }

    /// Makes a user a member of a role.
    pub async fn add_user_to_role(&self, username: &str, rolename: &str) -> ClientResult<()> {
        require("username", username)?;
        require("rolename", rolename)?;
        self.call_empty(
            Method::PUT,
            self.endpoints.role_member(rolename, username),
            None,
        )
        .await
    }

    /// Removes a user from a role.
    pub async fn remove_user_from_role(&self, username: &str, rolename: &str) -> ClientResult<()> {
        require("username", username)?;
        require("rolename", rolename)?;
        self.call_empty(
            Method::DELETE,
            self.endpoints.role_member(rolename, username),
            None,
        )
        .await
    }

    //////////////////////////////////////////////// Inputs ////////////////////////////////////////////////

    /// Lists inputs.
    pub async fn get_inputs(&self) -> ClientResult<InputsBody> {
        self.call(Method::GET, self.endpoints.inputs(), None).await
    }

    /// Retrieves an input.
    pub async fn get_input(&self, id: &str) -> ClientResult<Input> {
        require("id", id)?;
        self.call(Method::GET, self.endpoints.input(id), None).await
    }

    /// Creates an input.
    pub async fn create_input(&self, input: &Input) -> ClientResult<Input> {
        let body = Self::encode(input)?;
        self.call(Method::POST, self.endpoints.inputs(), body).await
    }

    /// Updates an input identified by its `id`.
    pub async fn update_input(&self, input: &Input) -> ClientResult<Input> {
        require("id", &input.id)?;
        let body = Self::encode(input)?;
        self.call(Method::PUT, self.endpoints.input(&input.id), body)
            .await
    }

    /// Deletes an input.
    pub async fn delete_input(&self, id: &str) -> ClientResult<()> {
        require("id", id)?;
        self.call_empty(Method::DELETE, self.endpoints.input(id), None)
            .await
    }
}
