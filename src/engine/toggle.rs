//! Boolean "active" switch stored as an effect duration.
//!
//! An active record carries a lifecycle effect whose duration is
//! [`LIFECYCLE_ON_SECONDS`]; an inactive one carries zero. The magnitude is a
//! sentinel, not a timer, and nothing counts it down.

use serde_json::{Map, Number, Value};

use crate::error::EngineError;
use crate::models::{EffectDescriptor, EffectDuration, EmbeddedRecord};

/// One week in seconds. Any positive duration reads as "on".
pub const LIFECYCLE_ON_SECONDS: u64 = 604_800;

const ZEROED_FIELDS: [&str; 4] = ["rounds", "turns", "startRound", "startTurn"];

pub fn encode(is_on: bool) -> EffectDuration {
    let mut rest = Map::new();
    rest.insert("startTime".to_string(), Value::Null);
    for key in ZEROED_FIELDS {
        rest.insert(key.to_string(), Value::from(0));
    }

    EffectDuration {
        seconds: Some(Number::from(if is_on { LIFECYCLE_ON_SECONDS } else { 0 })),
        rest,
    }
}

pub fn decode(duration: &EffectDuration) -> bool {
    duration.seconds() > 0.0
}

pub fn is_active(descriptor: &EffectDescriptor) -> bool {
    descriptor.duration.as_ref().is_some_and(decode)
}

/// Switch the record's lifecycle effect on or off.
///
/// Always targets the first descriptor, never one picked by display order.
pub fn apply(record: &mut EmbeddedRecord, is_on: bool) -> Result<(), EngineError> {
    let record_id = record.id.clone();
    let effect = record
        .lifecycle_effect_mut()
        .ok_or(EngineError::MissingLifecycleEffect(record_id))?;
    effect.duration = Some(encode(is_on));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_inverts_encode() {
        assert!(decode(&encode(true)));
        assert!(!decode(&encode(false)));
    }

    #[test]
    fn encoded_seconds_are_only_the_sentinel_or_zero() {
        assert_eq!(encode(true).seconds, Some(LIFECYCLE_ON_SECONDS.into()));
        assert_eq!(encode(false).seconds, Some(0.into()));
    }

    #[test]
    fn encoded_duration_zeroes_bookkeeping() {
        let value = serde_json::to_value(encode(true)).unwrap();
        assert_eq!(
            value,
            json!({
                "seconds": 604800,
                "startTime": null,
                "rounds": 0,
                "turns": 0,
                "startRound": 0,
                "startTurn": 0
            })
        );
    }

    #[test]
    fn any_positive_duration_reads_as_on() {
        let duration = EffectDuration {
            seconds: Some(60.into()),
            rest: Map::new(),
        };
        assert!(decode(&duration));
        assert!(!decode(&EffectDuration::default()));

        let fractional: EffectDuration = serde_json::from_value(json!({ "seconds": 3600.0 })).unwrap();
        assert!(decode(&fractional));
        let half: EffectDuration = serde_json::from_value(json!({ "seconds": 0.5 })).unwrap();
        assert!(decode(&half));
    }

    #[test]
    fn apply_only_touches_the_first_effect() {
        let mut record = EmbeddedRecord::from_value(json!({
            "id": "r1",
            "kind": "action",
            "effects": [
                { "id": "first", "duration": { "seconds": 0 } },
                { "id": "second", "duration": { "seconds": 0 } }
            ]
        }))
        .unwrap();

        apply(&mut record, true).unwrap();

        assert!(is_active(&record.effects()[0]));
        assert!(!is_active(&record.effects()[1]));
    }

    #[test]
    fn apply_fails_without_effects() {
        let mut record =
            EmbeddedRecord::from_value(json!({ "id": "r1", "kind": "action" })).unwrap();
        let err = apply(&mut record, true).unwrap_err();
        assert!(matches!(err, EngineError::MissingLifecycleEffect(id) if id == "r1"));
    }
}
