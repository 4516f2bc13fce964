//! Test data builders for creating test objects

use super::epoch;
use chrono::{DateTime, Utc};
use monitor_core::{
    AlarmState, OperationalMode, Sample, SharedClock, StageContext, StageProps, Value,
};

/// Builder for creating test Samples
pub struct SampleFixture {
    id: String,
    parent: String,
    value: Value,
    mode: OperationalMode,
    timestamp: DateTime<Utc>,
}

impl SampleFixture {
    pub fn new(id: &str, value: impl Into<Value>) -> Self {
        Self {
            id: id.to_string(),
            parent: "obs".to_string(),
            value: value.into(),
            mode: OperationalMode::Operational,
            timestamp: epoch() - chrono::Duration::hours(1),
        }
    }

    pub fn alarm(id: &str, state: AlarmState) -> Self {
        Self::new(id, Value::Alarm(state))
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = parent.to_string();
        self
    }

    pub fn mode(mut self, mode: OperationalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn running_id(&self) -> String {
        format!("{}:{}", self.parent, self.id)
    }

    pub fn build(self) -> Sample {
        let running_id = self.running_id();
        Sample::new(self.value, self.mode, &self.id, running_id, self.timestamp).unwrap()
    }
}

/// Stage context for the element `obs:<id>`
pub fn stage_context(id: &str, props: &[(&str, &str)], clock: SharedClock) -> StageContext {
    let props: StageProps = props.iter().copied().collect();
    StageContext::new(id, format!("obs:{}", id), props, clock).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_fixture() {
        let s = SampleFixture::new("temp1", 42i64)
            .parent("site:obs")
            .mode(OperationalMode::Degraded)
            .build();

        assert_eq!(s.id(), "temp1");
        assert_eq!(s.running_id(), "site:obs:temp1");
        assert_eq!(s.mode(), OperationalMode::Degraded);
        assert_eq!(s.get::<i64>(), Some(&42));
    }
}
