//! Immutable monitor-point samples
//!
//! A [`Sample`] is a snapshot of a monitor point: its payload, the time the
//! payload was assigned, the operational mode of its producer and its
//! identity. Samples never change once built. Updating one returns a new
//! sample with a fresh timestamp from the supplied [`Clock`]; anyone still
//! holding the old sample keeps seeing the old state, so samples can be
//! shared between threads without locking.
//!
//! # Example
//!
//! ```
//! use monitor_core::{ManualClock, OperationalMode, Sample, Value};
//!
//! let clock = ManualClock::default();
//! let temp = Sample::builder("temp1", "obs:temp1", monitor_core::ValueType::Int64)
//!     .payload(Value::Int64(42))
//!     .mode(OperationalMode::Operational)
//!     .build_with(&clock)?;
//!
//! let hotter = temp.with_value(Value::Int64(50), &clock)?;
//! assert_eq!(hotter.get::<i64>(), Some(&50));
//! assert_eq!(temp.get::<i64>(), Some(&42));
//! # Ok::<(), monitor_core::CoreError>(())
//! ```

use crate::alarm::{AlarmState, Trigger};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, Result};
use crate::identifier::Identifier;
use crate::types::{OperationalMode, Payload, Value, ValueType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Immutable typed value of a monitor point
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    id: Arc<str>,
    running_id: Arc<str>,
    value_type: ValueType,
    payload: Value,
    timestamp: DateTime<Utc>,
    mode: OperationalMode,
}

impl Sample {
    /// Start building a sample of the given type
    pub fn builder(
        id: impl AsRef<str>,
        running_id: impl AsRef<str>,
        value_type: ValueType,
    ) -> SampleBuilder {
        SampleBuilder {
            id: Arc::from(id.as_ref()),
            running_id: Arc::from(running_id.as_ref()),
            value_type,
            payload: None,
            mode: None,
            timestamp: None,
        }
    }

    /// Start building a sample whose identity comes from `identifier`
    pub fn builder_for(identifier: &Identifier, value_type: ValueType) -> SampleBuilder {
        SampleBuilder {
            id: identifier.id_arc(),
            running_id: identifier.running_id_arc(),
            value_type,
            payload: None,
            mode: None,
            timestamp: None,
        }
    }

    /// Build a sample whose type is taken from the payload
    pub fn new(
        payload: Value,
        mode: OperationalMode,
        id: impl AsRef<str>,
        running_id: impl AsRef<str>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        Sample::builder(id, running_id, payload.value_type())
            .payload(payload)
            .mode(mode)
            .timestamp(timestamp)
            .build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn running_id(&self) -> &str {
        &self.running_id
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn value(&self) -> &Value {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn mode(&self) -> OperationalMode {
        self.mode
    }

    /// Typed view of the payload, `None` if `T` is not this sample's type
    pub fn get<T: Payload>(&self) -> Option<&T> {
        T::from_value(&self.payload)
    }

    /// Alarm payload of an `ALARM` sample
    pub fn alarm(&self) -> Option<AlarmState> {
        self.payload.as_alarm().copied()
    }

    /// A new sample with `mode` and a fresh timestamp.
    ///
    /// The timestamp is whatever `clock` reads now. It is only guaranteed
    /// not to precede this sample's timestamp when this sample was stamped by
    /// the same (or a slower) clock.
    ///
    /// Fails with `InvalidArgument` if `mode` is `None`.
    pub fn with_mode<C: Clock + ?Sized>(
        &self,
        mode: impl Into<Option<OperationalMode>>,
        clock: &C,
    ) -> Result<Sample> {
        let mode = mode
            .into()
            .ok_or_else(|| CoreError::invalid("The mode can't be absent"))?;
        Ok(self.derive(self.payload.clone(), mode, clock))
    }

    /// A new sample carrying `value` and a fresh timestamp.
    ///
    /// As with [`Sample::with_mode`], the timestamp is `clock.now()` with no
    /// lower bound: a sample stamped ahead of `clock` yields an earlier one.
    ///
    /// Fails with `InvalidArgument` if `value` is `None` or its type differs
    /// from this sample's [`ValueType`].
    pub fn with_value<C: Clock + ?Sized>(
        &self,
        value: impl Into<Option<Value>>,
        clock: &C,
    ) -> Result<Sample> {
        let value = value
            .into()
            .ok_or_else(|| CoreError::invalid("The value can't be absent"))?;
        self.check_type(&value)?;
        Ok(self.derive(value, self.mode, clock))
    }

    /// Replace payload and mode under a single timestamp
    pub fn with_value_and_mode<C: Clock + ?Sized>(
        &self,
        value: impl Into<Option<Value>>,
        mode: impl Into<Option<OperationalMode>>,
        clock: &C,
    ) -> Result<Sample> {
        let value = value
            .into()
            .ok_or_else(|| CoreError::invalid("The value can't be absent"))?;
        let mode = mode
            .into()
            .ok_or_else(|| CoreError::invalid("The mode can't be absent"))?;
        self.check_type(&value)?;
        Ok(self.derive(value, mode, clock))
    }

    /// Typed form of [`Sample::with_value`]
    pub fn with_typed<T: Payload, C: Clock + ?Sized>(&self, value: T, clock: &C) -> Result<Sample> {
        self.with_value(value.into_value(), clock)
    }

    /// Apply [`AlarmState::transition`] to the payload of an `ALARM` sample
    pub fn with_alarm_transition<C: Clock + ?Sized>(
        &self,
        triggers: &BTreeSet<Trigger>,
        clock: &C,
    ) -> Result<Sample> {
        let current = self.alarm().ok_or_else(|| {
            CoreError::invalid(format!(
                "Sample '{}' is {}, not ALARM",
                self.running_id, self.value_type
            ))
        })?;
        let next = AlarmState::transition(current, triggers);
        Ok(self.derive(Value::Alarm(next), self.mode, clock))
    }

    /// JSON rendering for diagnostics; not a stable wire format
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    fn check_type(&self, value: &Value) -> Result<()> {
        if value.value_type() != self.value_type {
            return Err(CoreError::invalid(format!(
                "Sample '{}' holds {} values, got {}",
                self.running_id,
                self.value_type,
                value.value_type()
            )));
        }
        Ok(())
    }

    fn derive<C: Clock + ?Sized>(&self, payload: Value, mode: OperationalMode, clock: &C) -> Sample {
        Sample {
            id: Arc::clone(&self.id),
            running_id: Arc::clone(&self.running_id),
            value_type: self.value_type,
            payload,
            timestamp: clock.now(),
            mode,
        }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sample(id={}, runningId={}, value={}, timestamp={}, mode={}, type={})",
            self.id,
            self.running_id,
            self.payload,
            self.timestamp.to_rfc3339(),
            self.mode,
            self.value_type
        )
    }
}

/// Builder for [`Sample`]; every field except the timestamp is required
#[derive(Debug, Clone)]
pub struct SampleBuilder {
    id: Arc<str>,
    running_id: Arc<str>,
    value_type: ValueType,
    payload: Option<Value>,
    mode: Option<OperationalMode>,
    timestamp: Option<DateTime<Utc>>,
}

impl SampleBuilder {
    pub fn payload(mut self, payload: impl Into<Option<Value>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn mode(mut self, mode: impl Into<Option<OperationalMode>>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build, stamping with the wall clock if no timestamp was given
    pub fn build(self) -> Result<Sample> {
        self.build_with(&SystemClock)
    }

    /// Build, stamping with `clock` if no timestamp was given
    pub fn build_with<C: Clock + ?Sized>(self, clock: &C) -> Result<Sample> {
        if self.id.trim().is_empty() {
            return Err(CoreError::invalid("The id can't be empty"));
        }
        if self.running_id.trim().is_empty() {
            return Err(CoreError::invalid(format!(
                "The running id of '{}' can't be empty",
                self.id
            )));
        }
        let mode = self
            .mode
            .ok_or_else(|| CoreError::invalid(format!("The mode of '{}' can't be absent", self.id)))?;
        let payload = self.payload.ok_or_else(|| {
            CoreError::invalid(format!("The value of '{}' can't be absent", self.id))
        })?;
        if payload.value_type() != self.value_type {
            return Err(CoreError::invalid(format!(
                "'{}' is declared {} but the value is {}",
                self.id,
                self.value_type,
                payload.value_type()
            )));
        }

        Ok(Sample {
            timestamp: self.timestamp.unwrap_or_else(|| clock.now()),
            id: self.id,
            running_id: self.running_id,
            value_type: self.value_type,
            payload,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::Priority;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        "2024-05-01T12:00:00Z".parse().unwrap()
    }

    fn clock() -> ManualClock {
        ManualClock::ticking(start() + Duration::seconds(1), Duration::milliseconds(1))
    }

    fn temp1() -> Sample {
        Sample::new(
            Value::Int64(42),
            OperationalMode::Operational,
            "temp1",
            "obs:temp1",
            start(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_derives_type_from_payload() {
        let s = temp1();
        assert_eq!(s.value_type(), ValueType::Int64);
        assert_eq!(s.id(), "temp1");
        assert_eq!(s.running_id(), "obs:temp1");
        assert_eq!(s.timestamp(), start());
        assert_eq!(s.get::<i64>(), Some(&42));
        assert_eq!(s.get::<i32>(), None);
    }

    #[test]
    fn test_builder_requires_mode_and_payload() {
        let missing_mode = Sample::builder("a", "r:a", ValueType::Boolean)
            .payload(Value::Boolean(true))
            .timestamp(start())
            .build();
        assert!(missing_mode.unwrap_err().is_invalid_argument());

        let missing_payload = Sample::builder("a", "r:a", ValueType::Boolean)
            .mode(OperationalMode::Operational)
            .timestamp(start())
            .build();
        assert!(missing_payload.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_builder_rejects_empty_ids_and_type_mismatch() {
        let empty_id = Sample::new(
            Value::Int32(1),
            OperationalMode::Operational,
            "",
            "r",
            start(),
        );
        assert!(empty_id.unwrap_err().is_invalid_argument());

        let empty_running = Sample::new(
            Value::Int32(1),
            OperationalMode::Operational,
            "a",
            " ",
            start(),
        );
        assert!(empty_running.is_err());

        let mismatch = Sample::builder("a", "r:a", ValueType::Float64)
            .payload(Value::Int32(1))
            .mode(OperationalMode::Operational)
            .timestamp(start())
            .build();
        assert!(mismatch.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_builder_uses_clock_when_no_timestamp() {
        let clock = ManualClock::new(start());
        let s = Sample::builder("a", "r:a", ValueType::Char)
            .payload(Value::Char('z'))
            .mode(OperationalMode::Degraded)
            .build_with(&clock)
            .unwrap();
        assert_eq!(s.timestamp(), start());
    }

    #[test]
    fn test_builder_for_identifier() {
        let id = Identifier::from_path(["obs", "temp1"]).unwrap();
        let s = Sample::builder_for(&id, ValueType::Float32)
            .payload(Value::Float32(1.5))
            .mode(OperationalMode::Operational)
            .timestamp(start())
            .build()
            .unwrap();
        assert_eq!(s.running_id(), "obs:temp1");
    }

    #[test]
    fn test_with_value_scenario() {
        let clock = clock();
        let original = temp1();
        let updated = original.with_value(Value::Int64(50), &clock).unwrap();

        assert_eq!(updated.value(), &Value::Int64(50));
        assert_eq!(updated.mode(), OperationalMode::Operational);
        assert_eq!(updated.id(), "temp1");
        assert_eq!(updated.running_id(), "obs:temp1");
        assert_eq!(updated.value_type(), ValueType::Int64);
        assert!(updated.timestamp() > original.timestamp());

        // The source is untouched
        assert_eq!(original.value(), &Value::Int64(42));
        assert_eq!(original.timestamp(), start());
    }

    #[test]
    fn test_absent_arguments_are_rejected() {
        let clock = clock();
        let s = temp1();
        assert!(s.with_mode(None, &clock).unwrap_err().is_invalid_argument());
        assert!(s.with_value(None, &clock).unwrap_err().is_invalid_argument());
        assert!(s
            .with_value_and_mode(Value::Int64(1), None, &clock)
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_with_value_rejects_other_type() {
        let err = temp1()
            .with_value(Value::String("hot".into()), &clock())
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(temp1().with_typed(50i32, &clock()).is_err());
        assert!(temp1().with_typed(50i64, &clock()).is_ok());
    }

    #[test]
    fn test_timestamp_not_inherited() {
        let clock = ManualClock::new(start() + Duration::hours(3));
        let s = temp1()
            .with_mode(OperationalMode::Degraded, &clock)
            .unwrap();
        assert_eq!(s.timestamp(), start() + Duration::hours(3));
    }

    #[test]
    fn test_timestamp_follows_clock_without_lower_bound() {
        // Stamped an hour ahead of the clock used for the update
        let ahead = ManualClock::new(start() + Duration::hours(1));
        let s = temp1().with_value(Value::Int64(1), &ahead).unwrap();

        let behind = ManualClock::new(start());
        let earlier = s.with_mode(OperationalMode::Degraded, &behind).unwrap();
        assert_eq!(earlier.timestamp(), start());
        assert!(earlier.timestamp() < s.timestamp());

        let later = earlier.with_value(Value::Int64(2), &ahead).unwrap();
        assert!(later.timestamp() >= earlier.timestamp());
    }

    #[test]
    fn test_alarm_transition_on_sample() {
        let clock = clock();
        let alarm = Sample::new(
            Value::Alarm(AlarmState::CLEARED),
            OperationalMode::Operational,
            "hot",
            "obs:hot",
            start(),
        )
        .unwrap();
        let raised = alarm
            .with_alarm_transition(&[Trigger::Set(Priority::High)].into_iter().collect(), &clock)
            .unwrap();
        assert_eq!(raised.alarm(), Some(AlarmState::set(Priority::High)));

        let unchanged = raised
            .with_alarm_transition(&BTreeSet::new(), &clock)
            .unwrap();
        assert_eq!(unchanged.alarm(), raised.alarm());

        assert!(temp1()
            .with_alarm_transition(&BTreeSet::new(), &clock)
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_display_rendering() {
        let text = temp1().to_string();
        assert_eq!(
            text,
            "Sample(id=temp1, runningId=obs:temp1, value=42, timestamp=2024-05-01T12:00:00+00:00, mode=OPERATIONAL, type=INT64)"
        );
    }

    #[test]
    fn test_json_rendering() {
        let json = temp1().to_json().unwrap();
        assert!(json.contains(r#""runningId":"obs:temp1""#));
        assert!(json.contains(r#""mode":"OPERATIONAL""#));
        assert!(json.contains(r#""valueType":"INT64""#));
    }

    #[test]
    fn test_samples_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sample>();
    }

    fn mode_strategy() -> impl Strategy<Value = OperationalMode> {
        prop::sample::select(OperationalMode::all().to_vec())
    }

    proptest! {
        #[test]
        fn test_with_mode_properties(payload in any::<i64>(), mode in mode_strategy()) {
            let clock = clock();
            let s = Sample::new(Value::Int64(payload), OperationalMode::Unknown, "p", "x:p", start()).unwrap();
            let updated = s.with_mode(mode, &clock).unwrap();
            prop_assert_eq!(updated.mode(), mode);
            prop_assert_eq!(updated.value(), s.value());
            prop_assert_eq!(updated.value_type(), s.value_type());
            prop_assert!(updated.timestamp() >= s.timestamp());
        }

        #[test]
        fn test_with_value_properties(before in any::<i32>(), after in any::<i32>()) {
            let clock = clock();
            let s = Sample::new(Value::Int32(before), OperationalMode::Operational, "p", "x:p", start()).unwrap();
            let snapshot = s.clone();
            let updated = s.with_value(Value::Int32(after), &clock).unwrap();
            prop_assert_eq!(updated.value(), &Value::Int32(after));
            prop_assert_eq!(&s, &snapshot);
        }
    }
}
