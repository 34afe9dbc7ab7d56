use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::domain::ResponseParameters;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid response envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("request rejected: {code} {description}")]
    Rejected {
        code: i32,
        description: String,
        parameters: Option<ResponseParameters>,
    },

    #[error("invalid result payload: {0}")]
    MalformedResult(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct Envelope<'a> {
    ok: bool,
    #[serde(borrow, default)]
    result: Option<&'a RawValue>,
    #[serde(default)]
    error_code: Option<i32>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

fn open(raw: &[u8]) -> Result<Envelope<'_>, EnvelopeError> {
    let envelope: Envelope<'_> = serde_json::from_slice(raw).map_err(EnvelopeError::Malformed)?;
    if !envelope.ok {
        return Err(EnvelopeError::Rejected {
            code: envelope.error_code.unwrap_or_default(),
            description: envelope.description.unwrap_or_default(),
            parameters: envelope.parameters,
        });
    }
    Ok(envelope)
}

/// Decode an envelope and its `result` into `T`.
///
/// A missing `result` is read as JSON `null`.
pub fn decode_envelope<T: DeserializeOwned>(raw: &[u8]) -> Result<T, EnvelopeError> {
    let envelope = open(raw)?;
    let result = envelope.result.map(RawValue::get).unwrap_or("null");
    serde_json::from_str(result).map_err(EnvelopeError::MalformedResult)
}

/// Decode an envelope whose `result` the caller does not need.
pub fn decode_envelope_unit(raw: &[u8]) -> Result<(), EnvelopeError> {
    open(raw).map(|_| ())
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;
    use crate::domain::{Update, User};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shape {
        id: i64,
        name: String,
        tags: Vec<String>,
    }

    fn wrap<T: Serialize>(value: &T) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "ok": true, "result": value })).unwrap()
    }

    #[test]
    fn ok_envelope_yields_result() {
        let shape = Shape {
            id: 7,
            name: "seven".to_owned(),
            tags: vec!["a".to_owned()],
        };
        let decoded: Shape = decode_envelope(&wrap(&shape)).unwrap();
        assert_eq!(decoded, shape);

        let user = User {
            id: 1,
            is_bot: true,
            first_name: "bot".to_owned(),
            last_name: None,
            username: Some("test_bot".to_owned()),
            language_code: None,
        };
        let decoded: User = decode_envelope(&wrap(&user)).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn update_batches_decode_through_envelope() {
        let raw = br#"{"ok":true,"result":[{"update_id":1},{"update_id":2}]}"#;
        let updates: Vec<Update> = decode_envelope(raw).unwrap();
        assert_eq!(
            updates.iter().map(|u| u.update_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn rejected_envelope_is_classified() {
        let raw = br#"{"ok":false,"error_code":400,"description":"x"}"#;
        match decode_envelope::<bool>(raw).unwrap_err() {
            EnvelopeError::Rejected {
                code,
                description,
                parameters,
            } => {
                assert_eq!(code, 400);
                assert_eq!(description, "x");
                assert_eq!(parameters, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejected_envelope_keeps_parameters() {
        let raw = br#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":5}}"#;
        match decode_envelope_unit(raw).unwrap_err() {
            EnvelopeError::Rejected {
                code, parameters, ..
            } => {
                assert_eq!(code, 429);
                assert_eq!(parameters.and_then(|p| p.retry_after), Some(5));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncated_json_is_malformed_envelope() {
        let raw = br#"{"ok":true,"result":{"id":"#;
        assert!(matches!(
            decode_envelope::<Shape>(raw),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            decode_envelope_unit(raw),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn shape_mismatch_is_malformed_result() {
        let raw = br#"{"ok":true,"result":{"id":"not a number"}}"#;
        assert!(matches!(
            decode_envelope::<Shape>(raw),
            Err(EnvelopeError::MalformedResult(_))
        ));
    }

    #[test]
    fn missing_result_only_fits_optional_targets() {
        let raw = br#"{"ok":true}"#;
        assert_eq!(decode_envelope::<Option<Shape>>(raw).unwrap(), None);
        assert!(decode_envelope::<Shape>(raw).is_err());
        assert!(decode_envelope_unit(raw).is_ok());
    }

    #[test]
    fn unit_decode_ignores_result_shape() {
        let raw = br#"{"ok":true,"result":{"anything":[1,2,3]}}"#;
        assert!(decode_envelope_unit(raw).is_ok());
    }
}
