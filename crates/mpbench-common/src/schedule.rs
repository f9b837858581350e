//! Interference schedules.
//!
//! An [`InterruptStep`] list is the static timeline shared by every test
//! case. [`ConditionSchedule::build`] resolves it against one [`TestCase`]
//! into concrete [`ConditionEvent`]s: step `k` fires at
//! `(k + 1) * interrupt_duration` after run start.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{windows_after_start, PathConditions, PathPair, TestCase};

/// One entry of the static interrupt timeline.
///
/// Fields left as `None` keep the test case's own value for that parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterruptStep {
    pub loss_percent: PathPair<u32>,
    pub delay_ms: Option<PathPair<u32>>,
    pub bandwidth_kbit: Option<PathPair<Option<u64>>>,
}

/// A single condition mutation at a fixed offset from run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionEvent {
    pub offset: Duration,
    pub conditions: PathConditions,
}

/// Ordered, read-only sequence of condition mutations for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSchedule {
    events: Vec<ConditionEvent>,
}

impl ConditionSchedule {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the schedule from arbitrary events, ordered by offset.
    pub fn from_events(mut events: Vec<ConditionEvent>) -> Self {
        events.sort_by_key(|e| e.offset);
        Self { events }
    }

    pub fn build(steps: &[InterruptStep], case: &TestCase) -> Self {
        let window = case.interrupt_duration();
        // Steps whose offset overflows could never fire within a run.
        let events = steps
            .iter()
            .enumerate()
            .map_while(|(k, step)| {
                Some(ConditionEvent {
                    offset: windows_after_start(window, k)?,
                    conditions: PathConditions {
                        delay_ms: step.delay_ms.unwrap_or(case.delay_ms),
                        loss_percent: step.loss_percent,
                        bandwidth_kbit: step.bandwidth_kbit.unwrap_or(case.bandwidth_kbit),
                    },
                })
            })
            .collect();
        Self { events }
    }

    pub fn events(&self) -> &[ConditionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> TestCase {
        TestCase {
            congestion: "cubic".into(),
            scheduler: "minrtt".into(),
            bandwidth_kbit: PathPair::new(Some(10_000), None),
            delay_ms: PathPair::new(20, 30),
            loss_percent: PathPair::new(0, 0),
            interrupt_duration_ms: 1000,
        }
    }

    #[test]
    fn build_spaces_events_by_interrupt_window() {
        let steps = vec![
            InterruptStep {
                loss_percent: PathPair::new(5, 0),
                ..Default::default()
            },
            InterruptStep {
                loss_percent: PathPair::new(0, 5),
                delay_ms: Some(PathPair::new(100, 30)),
                bandwidth_kbit: None,
            },
        ];
        let schedule = ConditionSchedule::build(&steps, &case());

        assert_eq!(schedule.len(), 2);
        let offsets: Vec<_> = schedule.events().iter().map(|e| e.offset).collect();
        assert_eq!(
            offsets,
            vec![Duration::from_millis(1000), Duration::from_millis(2000)]
        );

        let first = schedule.events()[0].conditions;
        assert_eq!(first.delay_ms, PathPair::new(20, 30));
        assert_eq!(first.loss_percent, PathPair::new(5, 0));
        assert_eq!(first.bandwidth_kbit, PathPair::new(Some(10_000), None));

        let second = schedule.events()[1].conditions;
        assert_eq!(second.delay_ms, PathPair::new(100, 30));
    }

    #[test]
    fn build_without_steps_is_empty() {
        assert!(ConditionSchedule::build(&[], &case()).is_empty());
    }

    #[test]
    fn build_stops_at_overflowing_offsets() {
        let mut long = case();
        long.interrupt_duration_ms = u64::MAX;
        let steps = vec![InterruptStep::default(); 2000];
        let schedule = ConditionSchedule::build(&steps, &long);
        assert!(!schedule.is_empty());
        assert!(schedule.len() < steps.len());
        assert!(schedule.events().windows(2).all(|w| w[0].offset < w[1].offset));
    }

    #[test]
    fn from_events_orders_by_offset() {
        let late = ConditionEvent {
            offset: Duration::from_millis(300),
            conditions: PathConditions::baseline(),
        };
        let early = ConditionEvent {
            offset: Duration::from_millis(100),
            conditions: PathConditions::baseline(),
        };
        let schedule = ConditionSchedule::from_events(vec![late, early]);
        assert_eq!(schedule.events()[0].offset, Duration::from_millis(100));
    }
}
