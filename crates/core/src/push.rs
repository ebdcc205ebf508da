use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Notification sent by the recorder after it persisted new log data.
///
/// Receivers treat it as a hint to pull, never as the data itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum PushNotification {
    ActivityPersisted { activity_id: String, version: u64 },
}

impl PushNotification {
    pub const ACTIVITY_PERSISTED: &'static str = "activity_persisted";

    pub fn activity_persisted(activity_id: impl Into<String>, version: u64) -> Self {
        Self::ActivityPersisted {
            activity_id: activity_id.into(),
            version,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::ActivityPersisted { version, .. } => *version,
        }
    }

    pub fn activity_id(&self) -> &str {
        match self {
            Self::ActivityPersisted { activity_id, .. } => activity_id,
        }
    }

    /// Validate a raw payload at the channel boundary.
    pub fn parse(raw: &str) -> Result<Self, PushError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Decode through the derived representation, then apply the checks the
    /// wire format cannot express.
    pub fn from_value(value: &Value) -> Result<Self, PushError> {
        let object = value.as_object().ok_or(PushError::NotAnObject)?;
        let push = Self::deserialize(value).map_err(|source| {
            match object.get("kind").and_then(Value::as_str) {
                Some(kind) if kind != Self::ACTIVITY_PERSISTED => {
                    PushError::UnknownKind(kind.to_string())
                }
                _ => PushError::Malformed(source),
            }
        })?;
        push.validated()
    }

    fn validated(self) -> Result<Self, PushError> {
        match self {
            Self::ActivityPersisted {
                activity_id,
                version,
            } => {
                let activity_id = activity_id.trim();
                if activity_id.is_empty() {
                    return Err(PushError::InvalidField {
                        field: "activity_id",
                        reason: "must not be empty",
                    });
                }
                if version == 0 {
                    return Err(PushError::InvalidField {
                        field: "version",
                        reason: "must be greater than zero",
                    });
                }
                Ok(Self::activity_persisted(activity_id, version))
            }
        }
    }

    /// Serialize to the single-line JSON form used on the wire.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Why a push payload was rejected.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PushError {
    #[error("invalid push JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("push payload is not a JSON object")]
    NotAnObject,
    #[error("malformed push payload: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("push payload field `{field}` {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("unknown push kind: {0}")]
    UnknownKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_activity_persisted() {
        let push = PushNotification::parse(
            r#"{"kind":"activity_persisted","activity_id":"act-1","version":42}"#,
        )
        .unwrap();
        assert_eq!(push.activity_id(), "act-1");
        assert_eq!(push.version(), 42);
    }

    #[test]
    fn line_form_is_accepted_by_parse() {
        let push = PushNotification::activity_persisted("act-9", 9);
        let line = push.to_line().unwrap();
        assert_eq!(PushNotification::parse(&line).unwrap(), push);
    }

    #[test]
    fn rejects_missing_and_mistyped_fields() {
        let missing = PushNotification::parse(r#"{"kind":"activity_persisted","version":3}"#);
        assert!(matches!(
            &missing,
            Err(PushError::Malformed(e)) if e.to_string().contains("activity_id")
        ));

        let mistyped = PushNotification::parse(
            r#"{"kind":"activity_persisted","activity_id":"a","version":"3"}"#,
        );
        assert!(matches!(mistyped, Err(PushError::Malformed(_))));

        let no_kind = PushNotification::parse(r#"{"activity_id":"a","version":3}"#);
        assert!(matches!(no_kind, Err(PushError::Malformed(_))));

        let blank = PushNotification::parse(
            r#"{"kind":"activity_persisted","activity_id":"  ","version":3}"#,
        );
        assert!(matches!(
            blank,
            Err(PushError::InvalidField { field: "activity_id", .. })
        ));

        let zero = PushNotification::parse(
            r#"{"kind":"activity_persisted","activity_id":"a","version":0}"#,
        );
        assert!(matches!(
            zero,
            Err(PushError::InvalidField { field: "version", .. })
        ));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed_from_ids() {
        let push = PushNotification::parse(
            r#"{"kind":"activity_persisted","activity_id":" act-2 ","version":2,"extra":true}"#,
        )
        .unwrap();
        assert_eq!(push.activity_id(), "act-2");
    }

    #[test]
    fn rejects_unknown_kind_and_non_objects() {
        assert!(matches!(
            PushNotification::parse(r#"{"kind":"activity_deleted","activity_id":"a"}"#),
            Err(PushError::UnknownKind(kind)) if kind == "activity_deleted"
        ));
        assert!(matches!(
            PushNotification::parse("[1,2]"),
            Err(PushError::NotAnObject)
        ));
        assert!(matches!(
            PushNotification::parse("not json"),
            Err(PushError::InvalidJson(_))
        ));
    }
}
