//! Prometheus counters for fanout side effects.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Step {
    Invalidate,
    Broadcast,
    Notify,
    Email,
    FailureNotice,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Ok,
    Failed,
    TimedOut,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SideEffectLabels {
    pub step: Step,
    pub outcome: Outcome,
}

#[derive(Clone, Default)]
pub struct FanoutMetrics {
    side_effects: Family<SideEffectLabels, Counter>,
}

impl FanoutMetrics {
    /// Creates the counters and registers them under `askboard_fanout_*`.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "askboard_fanout_side_effects",
            "Fanout side effects attempted after a successful mutation, by step and outcome",
            metrics.side_effects.clone(),
        );
        metrics
    }

    pub fn record(&self, step: Step, outcome: Outcome) {
        self.side_effects
            .get_or_create(&SideEffectLabels { step, outcome })
            .inc();
    }

    pub fn count(&self, step: Step, outcome: Outcome) -> u64 {
        self.side_effects
            .get_or_create(&SideEffectLabels { step, outcome })
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn registered_counters_are_exposed() {
        let mut registry = Registry::default();
        let metrics = FanoutMetrics::register(&mut registry);
        metrics.record(Step::Email, Outcome::Failed);
        metrics.record(Step::Email, Outcome::Failed);

        let mut out = String::new();
        encode(&mut out, &registry).unwrap();
        assert!(out.contains("askboard_fanout_side_effects_total"));
        assert!(out.contains("step=\"Email\""));
        assert_eq!(metrics.count(Step::Email, Outcome::Failed), 2);
    }
}
