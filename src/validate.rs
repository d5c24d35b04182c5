//! # Request Body Validation
//!
//! This module reconciles the key set of a JSON request body against three field lists
//! before the body is turned into a typed record:
//!
//! - **required**: every one of these keys must be present
//! - **allowed**: when non-empty, no key outside `required ∪ allowed` may appear
//! - **accepted**: when non-empty, keys outside `required ∪ allowed ∪ accepted` are
//!   silently dropped (recognized but ignored fields)
//!
//! The loosely-typed [`RequestBody`] never travels further than [`decode_body`], which
//! turns it into the record type the store understands.
//!
//! ```rust
//! use graylog_mock::validate_request_body;
//!
//! let body = br#"{"title": "t", "index_prefix": "p"}"#;
//! let fields = validate_request_body(body, &["title", "index_prefix"], &["description"], &[])
//!     .unwrap();
//! assert_eq!(fields.len(), 2);
//!
//! let err = validate_request_body(br#"{"title": "t"}"#, &["title", "index_prefix"], &[], &[])
//!     .unwrap_err();
//! assert_eq!(err.status().as_u16(), 400);
//! ```

use std::collections::BTreeSet;

use axum::http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::ApiError;

/// A decoded, untyped JSON object awaiting conversion into a typed record.
pub type RequestBody = Map<String, Value>;

/// Errors that can occur while validating a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValidationError {
    /// The body is not valid JSON.
    InvalidJson {
        /// The raw body, lossily decoded for the message.
        body: String,
        /// The parser's error message.
        reason: String,
    },
    /// The body is valid JSON but not an object.
    NotAnObject {
        /// The raw body, lossily decoded for the message.
        body: String,
    },
    /// A required field is absent.
    MissingRequiredField {
        /// The name of the missing field.
        field: String,
    },
    /// A field outside the allowed set is present.
    UnexpectedField {
        /// The offending key.
        field: String,
        /// Every key that would have been allowed.
        allowed: Vec<String>,
        /// The raw body, lossily decoded for the message.
        body: String,
    },
    /// The validated object could not be decoded into the record type.
    Decode(String),
}

impl FieldValidationError {
    /// Validation failures are always reported as 400 Bad Request.
    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl std::fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson { body, reason } => write!(
                f,
                "Failed to parse the request body as JSON: {} ({})",
                body, reason
            ),
            Self::NotAnObject { body } => write!(
                f,
                "Failed to parse the request body as a JSON object : {}",
                body
            ),
            Self::MissingRequiredField { field } => {
                write!(f, "In the request body the field {} is required", field)
            }
            Self::UnexpectedField {
                field,
                allowed,
                body,
            } => write!(
                f,
                "In the request body an invalid field is found: {}\nThe allowed fields: {}, request body: {}",
                field,
                allowed.join(", "),
                body
            ),
            Self::Decode(reason) => write!(f, "Failed to decode the request body: {}", reason),
        }
    }
}

impl std::error::Error for FieldValidationError {}

impl From<FieldValidationError> for ApiError {
    fn from(e: FieldValidationError) -> Self {
        ApiError::new(e.status(), e.to_string())
    }
}

/// Validates the key set of a raw JSON body.
///
/// Required fields are checked in the order given, so the first missing one is the one
/// reported. On success the (possibly filtered) object is returned.
///
/// # Arguments
/// * `raw` - The raw request body
/// * `required` - Keys that must be present
/// * `allowed` - When non-empty, the only other keys that may be present
/// * `accepted` - When non-empty, additional keys that are kept; everything else is dropped
pub fn validate_request_body(
    raw: &[u8],
    required: &[&str],
    allowed: &[&str],
    accepted: &[&str],
) -> Result<RequestBody, FieldValidationError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| FieldValidationError::InvalidJson {
            body: String::from_utf8_lossy(raw).into_owned(),
            reason: e.to_string(),
        })?;
    let mut body = match value {
        Value::Object(body) => body,
        _ => {
            return Err(FieldValidationError::NotAnObject {
                body: String::from_utf8_lossy(raw).into_owned(),
            });
        }
    };

    if let Some(missing) = required.iter().find(|field| !body.contains_key(**field)) {
        return Err(FieldValidationError::MissingRequiredField {
            field: missing.to_string(),
        });
    }

    let mut known: BTreeSet<&str> = required.iter().copied().collect();
    if !allowed.is_empty() {
        known.extend(allowed.iter().copied());
        if let Some(unexpected) = body.keys().find(|k| !known.contains(k.as_str())) {
            return Err(FieldValidationError::UnexpectedField {
                field: unexpected.clone(),
                allowed: known.iter().map(|k| k.to_string()).collect(),
                body: String::from_utf8_lossy(raw).into_owned(),
            });
        }
    }

    if !accepted.is_empty() {
        known.extend(allowed.iter().copied());
        known.extend(accepted.iter().copied());
        body.retain(|k, _| known.contains(k.as_str()));
    }

    Ok(body)
}

/// Converts a validated body into a strongly-typed record.
pub fn decode_body<T: DeserializeOwned>(body: RequestBody) -> Result<T, FieldValidationError> {
    serde_json::from_value(Value::Object(body))
        .map_err(|e| FieldValidationError::Decode(e.to_string()))
}
