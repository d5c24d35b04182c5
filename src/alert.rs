//! Alerts and alert conditions.
//!
//! Both are read-only over HTTP: alerts are generated by the server, so the mock only
//! exposes them through the logic layer for seeding.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ApiError, ApiRequest, HandlerResult, Logic, User};

/// Number of alerts returned when the request does not name a limit.
pub const DEFAULT_ALERT_LIMIT: usize = 300;

/// A triggered alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Generated identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Description of what triggered the alert.
    #[serde(default)]
    pub description: String,
    /// The alert condition that fired.
    #[serde(default)]
    pub condition_id: String,
    /// The stream the condition belongs to.
    #[serde(default)]
    pub stream_id: String,
    /// When the alert was triggered.
    pub triggered_at: DateTime<Utc>,
    /// When the alert was resolved, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Whether the alert is still open.
    #[serde(default)]
    pub is_interval: bool,
    /// Condition parameters at trigger time.
    #[serde(default)]
    pub condition_parameters: Map<String, Value>,
}

/// A condition on a stream that triggers alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCondition {
    /// Generated identifier.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Condition type, e.g. `message_count`.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Creator of the condition.
    #[serde(default)]
    pub creator_user_id: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Type specific parameters.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Whether the condition currently fires.
    #[serde(default)]
    pub in_grace: bool,
}

/// How a list query answers a `limit` larger than the number of matching records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Lower the limit to what is available; `total` equals the number returned.
    #[default]
    ClampToAvailable,
    /// Lower the limit as well, but report every matching record in `total` so the
    /// caller can tell the page was truncated.
    ReportMatching,
}

/// Parameters of an alert list query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertQuery {
    /// Records to skip from the newest.
    pub skip: usize,
    /// Maximum number of records to return.
    pub limit: usize,
    /// Only alerts triggered at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// How `total` is reported.
    pub policy: LimitPolicy,
}

impl AlertQuery {
    /// Builds a query from `skip`, `limit` and `since` (unix seconds) query parameters.
    pub fn from_request(req: &ApiRequest) -> Result<Self, ApiError> {
        let skip = req.query_parse("skip", 0usize)?;
        let limit = req.query_parse("limit", DEFAULT_ALERT_LIMIT)?;
        let since = match req.query_parse("since", 0i64)? {
            0 => None,
            secs => Some(
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| ApiError::bad_request(format!("invalid since: {}", secs)))?,
            ),
        };
        Ok(Self {
            skip,
            limit,
            since,
            policy: LimitPolicy::default(),
        })
    }

    /// Applies the query to a list of alerts.
    ///
    /// Returns the page and the number of alerts that matched `since` after skipping.
    pub fn apply(&self, mut alerts: Vec<Alert>) -> (Vec<Alert>, usize) {
        if let Some(since) = self.since {
            alerts.retain(|a| a.triggered_at >= since);
        }
        alerts.sort_by(|a, b| {
            b.triggered_at
                .cmp(&a.triggered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let matching: Vec<Alert> = alerts.into_iter().skip(self.skip).collect();
        let available = matching.len();
        let limit = self.limit.min(available);
        let page: Vec<Alert> = matching.into_iter().take(limit).collect();
        let total = match self.policy {
            LimitPolicy::ClampToAvailable => page.len(),
            LimitPolicy::ReportMatching => available,
        };
        (page, total)
    }
}

/// Response body of the alert list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertsBody {
    /// The alerts, newest first.
    pub alerts: Vec<Alert>,
    /// See [`LimitPolicy`].
    pub total: usize,
}

/// Response body of the alert condition list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertConditionsBody {
    /// The conditions.
    pub conditions: Vec<AlertCondition>,
    /// Number of conditions.
    pub total: usize,
}

/// GET /streams/alerts
pub async fn handle_get_alerts(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<AlertsBody> {
    let query = AlertQuery::from_request(&req)?;
    let (alerts, total) = lgc.get_alerts(&query)?;
    Ok(Some(AlertsBody { alerts, total }))
}

/// GET /streams/alerts/{id}
pub async fn handle_get_alert(
    _user: Option<User>,
    lgc: Arc<Logic>,
    req: ApiRequest,
) -> HandlerResult<Alert> {
    Ok(Some(lgc.get_alert(req.param("alert_id"))?))
}

/// GET /alerts/conditions
pub async fn handle_get_alert_conditions(
    _user: Option<User>,
    lgc: Arc<Logic>,
    _req: ApiRequest,
) -> HandlerResult<AlertConditionsBody> {
    let (conditions, total) = lgc.get_alert_conditions()?;
    Ok(Some(AlertConditionsBody { conditions, total }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_alert(id: &str, triggered_secs: i64) -> Alert {
        Alert {
            id: id.to_string(),
            description: format!("alert {}", id),
            condition_id: "condition".to_string(),
            stream_id: "stream".to_string(),
            triggered_at: Utc.timestamp_opt(triggered_secs, 0).unwrap(),
            resolved_at: None,
            is_interval: false,
            condition_parameters: Map::new(),
        }
    }

    fn ids(alerts: &[Alert]) -> Vec<&str> {
        alerts.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn newest_first() {
        let query = AlertQuery {
            limit: 10,
            ..Default::default()
        };
        let (page, total) = query.apply(vec![
            test_alert("a", 100),
            test_alert("b", 300),
            test_alert("c", 200),
        ]);
        assert_eq!(ids(&page), vec!["b", "c", "a"]);
        assert_eq!(total, 3);
    }

    #[test]
    fn limit_is_clamped_to_available() {
        let query = AlertQuery {
            limit: 1000,
            ..Default::default()
        };
        let (page, total) = query.apply(vec![test_alert("a", 1), test_alert("b", 2)]);
        assert_eq!(page.len(), 2);
        assert_eq!(total, 2);
    }

    #[test]
    fn total_follows_policy() {
        let alerts = vec![test_alert("a", 1), test_alert("b", 2), test_alert("c", 3)];
        let clamp = AlertQuery {
            limit: 1,
            ..Default::default()
        };
        assert_eq!(clamp.apply(alerts.clone()).1, 1);
        let report = AlertQuery {
            limit: 1,
            policy: LimitPolicy::ReportMatching,
            ..Default::default()
        };
        let (page, total) = report.apply(alerts);
        assert_eq!(page.len(), 1);
        assert_eq!(total, 3);
    }

    #[test]
    fn skip_and_since_filter() {
        let alerts = vec![
            test_alert("a", 100),
            test_alert("b", 200),
            test_alert("c", 300),
            test_alert("d", 400),
        ];
        let query = AlertQuery {
            skip: 1,
            limit: 10,
            since: Some(Utc.timestamp_opt(200, 0).unwrap()),
            ..Default::default()
        };
        let (page, _) = query.apply(alerts);
        assert_eq!(ids(&page), vec!["c", "b"]);
    }

    #[test]
    fn query_from_request_parameters() {
        let req = ApiRequest::new(axum::http::Method::GET, "/streams/alerts")
            .with_query("skip", "2")
            .with_query("limit", "5")
            .with_query("since", "60");
        let query = AlertQuery::from_request(&req).unwrap();
        assert_eq!(query.skip, 2);
        assert_eq!(query.limit, 5);
        assert_eq!(query.since, Some(Utc.timestamp_opt(60, 0).unwrap()));

        let req = ApiRequest::new(axum::http::Method::GET, "/streams/alerts");
        let query = AlertQuery::from_request(&req).unwrap();
        assert_eq!(query.limit, DEFAULT_ALERT_LIMIT);
        assert_eq!(query.since, None);

        let req = ApiRequest::new(axum::http::Method::GET, "/streams/alerts")
            .with_query("limit", "many");
        assert_eq!(
            AlertQuery::from_request(&req).unwrap_err().status.as_u16(),
            400
        );
    }
}
