//! Core types for the changes-feed client.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in the change log.
///
/// Positions are:
/// - Opaque: Do not parse or interpret token structure
/// - Server-issued: After the first successful exchange, a position is
///   always the last `last_seq` the server returned
/// - Persistent: Valid as a resume point for the database's lifetime
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FeedPosition {
    /// Absolute beginning of the change log (wire value "0")
    Zero,
    /// Current tail of the change log, only future changes (wire value "now")
    Now,
    /// A specific server-issued sequence token
    At(String),
}

impl FeedPosition {
    /// Create a position at a specific sequence token.
    ///
    /// This is a convenience constructor for `FeedPosition::At`.
    ///
    /// # Example
    /// ```
    /// use changes_follower::FeedPosition;
    /// let position = FeedPosition::at("23-g1AAAACb");
    /// ```
    pub fn at(s: impl Into<String>) -> Self {
        FeedPosition::At(s.into())
    }

    /// Parse from the wire representation
    pub fn parse(s: &str) -> Self {
        match s {
            "0" => FeedPosition::Zero,
            "now" => FeedPosition::Now,
            "" => FeedPosition::Zero,
            other => FeedPosition::At(other.to_string()),
        }
    }

    /// Convert to the `since` query parameter value
    pub fn as_str(&self) -> &str {
        match self {
            FeedPosition::Zero => "0",
            FeedPosition::Now => "now",
            FeedPosition::At(s) => s.as_str(),
        }
    }

    /// Check if this is the beginning sentinel
    pub fn is_zero(&self) -> bool {
        matches!(self, FeedPosition::Zero)
    }

    /// Check if this is the tail sentinel
    pub fn is_now(&self) -> bool {
        matches!(self, FeedPosition::Now)
    }
}

impl Default for FeedPosition {
    fn default() -> Self {
        FeedPosition::Now
    }
}

impl fmt::Display for FeedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for FeedPosition {
    fn from(s: String) -> Self {
        FeedPosition::parse(&s)
    }
}

impl From<&str> for FeedPosition {
    fn from(s: &str) -> Self {
        FeedPosition::parse(s)
    }
}

/// A single revision descriptor inside a change entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRef {
    /// Opaque revision token
    pub rev: String,
}

/// One entry of the changes feed, describing a single document mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Document identifier
    pub id: String,
    /// Revision descriptors for this mutation, server order
    #[serde(default)]
    pub changes: Vec<RevisionRef>,
    /// Document body, present only when bodies were requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<serde_json::Value>,
    /// Set when the mutation is a deletion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

/// One page of the changes feed - the unit of a single HTTP exchange.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChangesPage {
    /// Change entries in server order
    #[serde(default)]
    pub results: Vec<ChangeRecord>,
    /// Position valid after consuming this page
    #[serde(default, deserialize_with = "position_opt")]
    pub last_seq: Option<FeedPosition>,
    /// Server hint of how many changes remain after this page
    #[serde(default)]
    pub pending: Option<u64>,
}

/// Sequence tokens arrive as strings on current servers and as plain
/// integers on older ones; accept both.
fn position_opt<'de, D>(deserializer: D) -> Result<Option<FeedPosition>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(FeedPosition::parse(&s))),
        Some(serde_json::Value::Number(n)) => Ok(Some(FeedPosition::parse(&n.to_string()))),
        Some(other) => Err(de::Error::custom(format!(
            "last_seq must be a string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_parse_sentinels() {
        assert_eq!(FeedPosition::parse("0"), FeedPosition::Zero);
        assert_eq!(FeedPosition::parse("now"), FeedPosition::Now);
        assert_eq!(FeedPosition::parse(""), FeedPosition::Zero);
        assert_eq!(
            FeedPosition::parse("42-abc"),
            FeedPosition::At("42-abc".to_string())
        );
    }

    #[test]
    fn test_position_roundtrip() {
        for raw in ["0", "now", "42-abc"] {
            assert_eq!(FeedPosition::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn test_position_default_is_tail() {
        assert_eq!(FeedPosition::default(), FeedPosition::Now);
    }

    #[test]
    fn test_page_deserialize_full() {
        let raw = r#"{
            "results": [
                {"id": "a", "changes": [{"rev": "1-x"}]},
                {"id": "b", "changes": [{"rev": "2-y"}], "deleted": true},
                {"id": "c", "changes": [{"rev": "1-z"}], "doc": {"_id": "c", "n": 3}}
            ],
            "last_seq": "3-g1AAAACb",
            "pending": 17
        }"#;

        let page: ChangesPage = serde_json::from_str(raw).unwrap();
        assert_eq!(page.results.len(), 3);
        assert_eq!(page.results[0].id, "a");
        assert_eq!(page.results[1].deleted, Some(true));
        assert_eq!(page.results[2].doc.as_ref().unwrap()["n"], 3);
        assert_eq!(page.last_seq, Some(FeedPosition::at("3-g1AAAACb")));
        assert_eq!(page.pending, Some(17));
    }

    #[test]
    fn test_page_deserialize_integer_seq() {
        let page: ChangesPage = serde_json::from_str(r#"{"results": [], "last_seq": 25}"#).unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.last_seq, Some(FeedPosition::at("25")));
    }

    #[test]
    fn test_page_deserialize_sparse() {
        let page: ChangesPage = serde_json::from_str("{}").unwrap();
        assert!(page.results.is_empty());
        assert_eq!(page.last_seq, None);
        assert_eq!(page.pending, None);
    }
}
