//! # Inputs
//!
//! An input is a message receiver. Its `configuration` object has a different shape for
//! every input `type`; the type string selects the variant of [`InputAttributes`] used
//! to decode it. Unknown types are rejected when the request body is decoded.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{ApiRequest, HandlerResult, Logic, User, decode_body, validate_request_body};

/// Type of the fake HTTP message input.
pub const INPUT_TYPE_FAKE_HTTP_MESSAGE: &str = "org.graylog2.inputs.random.FakeHttpMessageInput";
/// Type of the GELF UDP input.
pub const INPUT_TYPE_GELF_UDP: &str = "org.graylog2.inputs.gelf.udp.GELFUDPInput";
/// Type of the GELF TCP input.
pub const INPUT_TYPE_GELF_TCP: &str = "org.graylog2.inputs.gelf.tcp.GELFTCPInput";
/// Type of the syslog UDP input.
pub const INPUT_TYPE_SYSLOG_UDP: &str = "org.graylog2.inputs.syslog.udp.SyslogUDPInput";

const INPUT_REQUIRED_FIELDS: &[&str] = &["title", "type", "configuration"];
const INPUT_ALLOWED_FIELDS: &[&str] = &["global", "node"];

/// Configuration of a fake HTTP message input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeHttpMessageAttrs {
    /// Milliseconds between messages.
    #[serde(skip_serializing_if = "is_zero")]
    pub sleep: i64,
    /// Random deviation of `sleep`.
    #[serde(skip_serializing_if = "is_zero")]
    pub sleep_deviation: i64,
    /// Source field of the generated messages.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Replaces the source of every message.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub override_source: String,
    /// Whether the input may be throttled.
    #[serde(skip_serializing_if = "is_false")]
    pub throttling_allowed: bool,
}

/// Configuration of a GELF UDP input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GelfUdpAttrs {
    /// Address to listen on.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bind_address: String,
    /// Port to listen on.
    #[serde(skip_serializing_if = "is_zero")]
    pub port: i64,
    /// Receive buffer size in bytes.
    #[serde(skip_serializing_if = "is_zero")]
    pub recv_buffer_size: i64,
    /// Maximum size of a decompressed message.
    #[serde(skip_serializing_if = "is_zero")]
    pub decompress_size_limit: i64,
    /// Replaces the source of every message.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub override_source: String,
}

/// Configuration of a GELF TCP input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GelfTcpAttrs {
    /// Address to listen on.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bind_address: String,
    /// Port to listen on.
    #[serde(skip_serializing_if = "is_zero")]
    pub port: i64,
    /// Receive buffer size in bytes.
    #[serde(skip_serializing_if = "is_zero")]
    pub recv_buffer_size: i64,
    /// Maximum message size in bytes.
    #[serde(skip_serializing_if = "is_zero")]
    pub max_message_size: i64,
    /// Whether TLS is enabled.
    #[serde(skip_serializing_if = "is_false")]
    pub tls_enable: bool,
    /// Whether frames are null delimited.
    #[serde(skip_serializing_if = "is_false")]
    pub use_null_delimiter: bool,
    /// Replaces the source of every message.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub override_source: String,
}

/// Configuration of a syslog UDP input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogUdpAttrs {
    /// Address to listen on.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub bind_address: String,
    /// Port to listen on.
    #[serde(skip_serializing_if = "is_zero")]
    pub port: i64,
    /// Receive buffer size in bytes.
    #[serde(skip_serializing_if = "is_zero")]
    pub recv_buffer_size: i64,
    /// Whether the message date may be overridden.
    #[serde(skip_serializing_if = "is_false")]
    pub allow_override_date: bool,
    /// Whether the full message is stored.
    #[serde(skip_serializing_if = "is_false")]
    pub store_full_message: bool,
    /// Whether structured data is expanded.
    #[serde(skip_serializing_if = "is_false")]
    pub expand_structured_data: bool,
    /// Whether reverse DNS lookups are forced.
    #[serde(skip_serializing_if = "is_false")]
    pub force_rdns: bool,
    /// Replaces the source of every message.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub override_source: String,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The type-specific configuration of an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InputAttributes {
    /// [`INPUT_TYPE_FAKE_HTTP_MESSAGE`]
    FakeHttpMessage(FakeHttpMessageAttrs),
    /// [`INPUT_TYPE_GELF_UDP`]
    GelfUdp(GelfUdpAttrs),
    /// [`INPUT_TYPE_GELF_TCP`]
    GelfTcp(GelfTcpAttrs),
    /// [`INPUT_TYPE_SYSLOG_UDP`]
    SyslogUdp(SyslogUdpAttrs),
}

impl InputAttributes {
    /// Decodes `configuration` according to the `input_type` discriminator.
    pub fn from_parts(input_type: &str, configuration: Value) -> Result<Self, String> {
        let decoded = match input_type {
            INPUT_TYPE_FAKE_HTTP_MESSAGE => {
                serde_json::from_value(configuration).map(Self::FakeHttpMessage)
            }
            INPUT_TYPE_GELF_UDP => serde_json::from_value(configuration).map(Self::GelfUdp),
            INPUT_TYPE_GELF_TCP => serde_json::from_value(configuration).map(Self::GelfTcp),
            INPUT_TYPE_SYSLOG_UDP => serde_json::from_value(configuration).map(Self::SyslogUdp),
            other => return Err(format!("unknown input type: {}", other)),
        };
        decoded.map_err(|e| format!("invalid configuration for {}: {}", input_type, e))
    }

    /// The discriminator string of this variant.
    pub fn input_type(&self) -> &'static str {
        match self {
            Self::FakeHttpMessage(_) => INPUT_TYPE_FAKE_HTTP_MESSAGE,
            Self::GelfUdp(_) => INPUT_TYPE_GELF_UDP,
            Self::GelfTcp(_) => INPUT_TYPE_GELF_TCP,
            Self::SyslogUdp(_) => INPUT_TYPE_SYSLOG_UDP,
        }
    }
}

/// The wire shape of an input, with an untyped configuration.
#[derive(Debug, Clone, Deserialize)]
struct InputData {
    #[serde(default)]
    id: String,
    title: String,
    #[serde(rename = "type")]
    input_type: String,
    #[serde(default)]
    global: bool,
    #[serde(default)]
    node: Option<String>,
    configuration: Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    creator_user_id: Option<String>,
}

/// A message input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "InputData")]
pub struct Input {
    /// Generated identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Whether the input runs on every node.
    pub global: bool,
    /// The node the input runs on, for non-global inputs.
    pub node: Option<String>,
    /// Type and configuration.
    pub attributes: InputAttributes,
    /// Creation time, assigned by the store.
    pub created_at: Option<DateTime<Utc>>,
    /// The user who created the input.
    pub creator_user_id: Option<String>,
}

impl TryFrom<InputData> for Input {
    type Error = String;

    fn try_from(data: InputData) -> Result<Self, Self::Error> {
        Ok(Self {
            attributes: InputAttributes::from_parts(&data.input_type, data.configuration)?,
            id: data.id,
            title: data.title,
            global: data.global,
            node: data.node,
            created_at: data.created_at,
            creator_user_id: data.creator_user_id,
        })
    }
}

impl Serialize for Input {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(skip_serializing_if = "String::is_empty")]
            id: &'a String,
            title: &'a str,
            #[serde(rename = "type")]
            input_type: &'static str,
            global: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            node: Option<&'a str>,
            configuration: &'a InputAttributes,
            #[serde(skip_serializing_if = "Option::is_none")]
            created_at: Option<&'a DateTime<Utc>>,
            #[serde(skip_serializing_if = "Option::is_none")]
            creator_user_id: Option<&'a str>,
        }
        Wire {
            id: &self.id,
            title: &self.title,
            input_type: self.attributes.input_type(),
            global: self.global,
            node: self.node.as_deref(),
            configuration: &self.attributes,
            created_at: self.created_at.as_ref(),
            creator_user_id: self.creator_user_id.as_deref(),
        }
        .serialize(serializer)
    }
}

impl Input {
    /// Creates a global input with the given title and attributes.
    pub fn new(title: impl Into<String>, attributes: InputAttributes) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            global: true,
            node: None,
            attributes,
            created_at: None,
            creator_user_id: None,
        }
    }

    /// Struct-level validation run by the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_empty() {
            return Err("title is required".to_string());
        }
        if !self.global && self.node.as_deref().unwrap_or_default().is_empty() {
            return Err("node is required when the input is not global".to_string());
        }
        Ok(())
    }
}

/// Response body of the input list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputsBody {
    /// The inputs.
    pub inputs: Vec<Input>,
    /// Number of inputs.
    pub total: usize,
}

/// GET /system/inputs
pub async fn handle_get_inputs(
    _user: Option<User>,
    lgc: Arc<Logic>,
    _req: ApiRequest,
) -> HandlerResult<InputsBody> {
    let (inputs, total) = lgc.get_inputs()?;
    Ok(Some(InputsBody { inputs, total }))
}

/// GET /system/inputs/{id}
pub async fn handle_get_input(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<Input> {
    Ok(Some(lgc.get_input(req.param("input_id"))?))
}

/// POST /system/inputs
pub async fn handle_create_input(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<Input> {
    lgc.authorize(user.as_ref(), "inputs:create")?;
    let body = validate_request_body(&req.body, INPUT_REQUIRED_FIELDS, INPUT_ALLOWED_FIELDS, &[])?;
    let mut input: Input = decode_body(body)?;
    input.creator_user_id = user.map(|u| u.username);
    Ok(Some(lgc.add_input(input)?))
}

/// PUT /system/inputs/{id}
pub async fn handle_update_input(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<Input> {
    lgc.authorize(user.as_ref(), "inputs:edit")?;
    let body = validate_request_body(&req.body, INPUT_REQUIRED_FIELDS, &[], INPUT_ALLOWED_FIELDS)?;
    let mut input: Input = decode_body(body)?;
    input.id = req.param("input_id").to_string();
    Ok(Some(lgc.update_input(input)?))
}

/// DELETE /system/inputs/{id}
pub async fn handle_delete_input(
    user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<()> {
    lgc.authorize(user.as_ref(), "inputs:terminate")?;
    lgc.delete_input(req.param("input_id"))?;
    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn test_input(title: &str) -> Input {
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

    #[test]
    fn discriminator_selects_attributes() {
        let input: Input = serde_json::from_value(json!({
            "title": "gelf",
            "type": INPUT_TYPE_GELF_UDP,
            "configuration": {"bind_address": "0.0.0.0", "port": 12201}
        }))
        .unwrap();
        match &input.attributes {
            InputAttributes::GelfUdp(attrs) => {
                assert_eq!(attrs.bind_address, "0.0.0.0");
                assert_eq!(attrs.port, 12201);
            }
            other => panic!("unexpected attributes: {:?}", other),
        }
        assert!(!input.global);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: Result<Input, _> = serde_json::from_value(json!({
            "title": "x",
            "type": "org.example.Unknown",
            "configuration": {}
        }));
        assert!(result.unwrap_err().to_string().contains("unknown input type"));
    }

    #[test]
    fn serializes_type_and_configuration() {
        let value = serde_json::to_value(test_input("fake")).unwrap();
        assert_eq!(value["type"], INPUT_TYPE_FAKE_HTTP_MESSAGE);
        assert_eq!(
            value["configuration"],
            json!({"sleep": 25, "sleep_deviation": 30, "source": "example.org"})
        );
        assert!(value.get("id").is_none());
        assert!(value.get("node").is_none());

        let back: Input = serde_json::from_value(value).unwrap();
        assert_eq!(back, test_input("fake"));
    }

    #[test]
    fn non_global_inputs_need_a_node() {
        let mut input = test_input("fake");
        input.global = false;
        assert!(input.validate().is_err());
        input.node = Some("node-1".to_string());
        assert!(input.validate().is_ok());
        input.title.clear();
        assert!(input.validate().is_err());
    }
}
