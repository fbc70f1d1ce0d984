//! Record schemas for the user-action and event-similarity streams.
//!
//! Every service in the stats pipeline (collector, aggregator, analyzer)
//! serializes stream records through these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default topic names
pub mod topics {
    /// Raw user interactions, keyed by user id
    pub const USER_ACTIONS: &str = "stats.user-actions.v1";
    /// Pairwise similarity updates, keyed by `"{event_a}:{event_b}"`
    pub const EVENTS_SIMILARITY: &str = "stats.events-similarity.v1";
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

// ============================================================================
// USER ACTIONS
// ============================================================================

/// Kind of interaction a user had with an event.
///
/// Variants are declared weakest first, so the derived `Ord` agrees with
/// the weight order: `Like > Register > View`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    View,
    Register,
    Like,
}

impl ActionType {
    pub const ALL: [ActionType; 3] = [ActionType::View, ActionType::Register, ActionType::Like];

    /// Interaction intensity used by both the aggregator and the query service.
    pub const fn weight(self) -> f64 {
        match self {
            ActionType::View => 0.4,
            ActionType::Register => 0.8,
            ActionType::Like => 1.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ActionType::View => "VIEW",
            ActionType::Register => "REGISTER",
            ActionType::Like => "LIKE",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "VIEW" => Ok(ActionType::View),
            "REGISTER" => Ok(ActionType::Register),
            "LIKE" => Ok(ActionType::Like),
            other => Err(SchemaError::UnknownActionType(other.to_string())),
        }
    }
}

/// One interaction, as published on the user-actions topic.
///
/// At-least-once delivery means the same action may be observed more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub user_id: i64,
    pub event_id: i64,
    pub action_type: ActionType,
    pub timestamp: DateTime<Utc>,
}

impl ActionEvent {
    pub fn new(user_id: i64, event_id: i64, action_type: ActionType) -> Self {
        Self {
            user_id,
            event_id,
            action_type,
            timestamp: Utc::now(),
        }
    }

    pub fn weight(&self) -> f64 {
        self.action_type.weight()
    }

    /// Partition key: per-user ordering is preserved within a partition.
    pub fn key(&self) -> String {
        self.user_id.to_string()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

// ============================================================================
// EVENT SIMILARITY
// ============================================================================

/// Full current similarity score of an unordered event pair.
///
/// Each record carries the complete score, not a delta, so a consumer may
/// apply records with last-write-wins semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSimilarity {
    pub event_a: i64,
    pub event_b: i64,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

impl EventSimilarity {
    /// Build a record for the pair in canonical `event_a < event_b` order.
    pub fn new(first: i64, second: i64, score: f64, timestamp: DateTime<Utc>) -> Self {
        let (event_a, event_b) = canonical_pair(first, second);
        Self {
            event_a,
            event_b,
            score,
            timestamp,
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.event_a < self.event_b
    }

    /// Return the record with its pair swapped into canonical order if needed.
    pub fn canonicalized(self) -> Self {
        Self::new(self.event_a, self.event_b, self.score, self.timestamp)
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.event_a, self.event_b)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Order a pair of event ids as `(min, max)`.
pub fn canonical_pair(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_follow_action_order() {
        assert_eq!(ActionType::View.weight(), 0.4);
        assert_eq!(ActionType::Register.weight(), 0.8);
        assert_eq!(ActionType::Like.weight(), 1.0);

        assert!(ActionType::Like > ActionType::Register);
        assert!(ActionType::Register > ActionType::View);
        for pair in ActionType::ALL.windows(2) {
            assert!(pair[0].weight() < pair[1].weight());
        }
    }

    #[test]
    fn test_action_type_from_str() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
        assert!(matches!(
            "CLICK".parse::<ActionType>(),
            Err(SchemaError::UnknownActionType(_))
        ));
    }

    #[test]
    fn test_action_event_wire_format() {
        let json = r#"{
            "user_id": 1,
            "event_id": 10,
            "action_type": "REGISTER",
            "timestamp": "2024-03-01T12:00:00Z"
        }"#;

        let action = ActionEvent::from_payload(json.as_bytes()).unwrap();
        assert_eq!(action.user_id, 1);
        assert_eq!(action.event_id, 10);
        assert_eq!(action.action_type, ActionType::Register);
        assert_eq!(action.key(), "1");

        let value: serde_json::Value = serde_json::from_slice(&action.to_payload().unwrap()).unwrap();
        assert_eq!(value["action_type"], "REGISTER");
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let err = ActionEvent::from_payload(br#"{"user_id": "abc"}"#).unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));

        let err = ActionEvent::from_payload(
            br#"{"user_id":1,"event_id":2,"action_type":"SHARE","timestamp":"2024-03-01T12:00:00Z"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn test_similarity_is_canonical() {
        let now = Utc::now();
        let record = EventSimilarity::new(11, 10, 0.5, now);
        assert_eq!((record.event_a, record.event_b), (10, 11));
        assert!(record.is_canonical());
        assert_eq!(record.key(), "10:11");

        let swapped = EventSimilarity {
            event_a: 7,
            event_b: 3,
            score: 0.2,
            timestamp: now,
        };
        assert!(!swapped.is_canonical());
        let fixed = swapped.canonicalized();
        assert_eq!((fixed.event_a, fixed.event_b), (3, 7));
    }
}
