//! Alert rules and their evaluation
//!
//! ## Breach State Machine
//!
//! Each rule keeps a [`RuleState`] and every value is classified first, then
//! applied to the state:
//!
//! ```text
//! value <= threshold:
//!   not breached                  → RuleEvaluation::Ok
//!   breached                      → RuleEvaluation::BackToOk (re-arm, no alert)
//!
//! value > threshold:
//!   cooldown elapsed / never fired → RuleEvaluation::StartsToExceed (alert)
//!   not breached, cooling down     → RuleEvaluation::Suppressed (breached, no alert)
//!   breached, cooling down         → RuleEvaluation::Exceeding (no alert)
//! ```
//!
//! A breach that outlasts the cooldown fires again once the cooldown since the
//! last alert has elapsed.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{MetricPath, Snapshot, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

fn default_cooldown_secs() -> f64 {
    60.0
}

/// Threshold rule on a single metric path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub metric: MetricPath,
    pub threshold: f64,
    pub severity: Severity,
    /// Minimum time between two alerts of this rule, fractions allowed
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
}

impl AlertRule {
    pub fn new(metric: MetricPath, threshold: f64, severity: Severity) -> Self {
        Self {
            metric,
            threshold,
            severity,
            cooldown_secs: default_cooldown_secs(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_secs = cooldown.as_secs_f64();
        self
    }

    /// Cooldown as a duration, zero when negative or not a number
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_secs).unwrap_or_else(|_| {
            if self.cooldown_secs > 0.0 {
                Duration::MAX
            } else {
                Duration::ZERO
            }
        })
    }

    fn message(&self, value: f64) -> String {
        let label = self.metric.label();
        if self.metric.is_percentage() {
            let mut chars = label.chars();
            let label = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            };
            format!("High {label}: {value:.1}%")
        } else {
            format!("{label} above threshold: {value} (threshold {})", self.threshold)
        }
    }
}

/// Alert event, never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: MetricPath,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
}

/// Per-rule edge detection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleState {
    pub currently_breached: bool,
    pub last_fired_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleEvaluation {
    Ok,
    Exceeding,
    Suppressed,
    StartsToExceed,
    BackToOk,
}

impl RuleEvaluation {
    pub fn evaluate(
        value: f64,
        threshold: f64,
        state: &RuleState,
        now: Timestamp,
        cooldown: Duration,
    ) -> RuleEvaluation {
        // NaN never exceeds a threshold
        if value.is_nan() || value <= threshold {
            if state.currently_breached {
                return RuleEvaluation::BackToOk;
            }
            return RuleEvaluation::Ok;
        }

        let cooled_down = state
            .last_fired_at
            .is_none_or(|fired| now.since(&fired) >= cooldown);

        match (state.currently_breached, cooled_down) {
            (_, true) => RuleEvaluation::StartsToExceed,
            (false, false) => RuleEvaluation::Suppressed,
            (true, false) => RuleEvaluation::Exceeding,
        }
    }
}

impl RuleState {
    /// Apply an evaluation, returns whether an alert has to be emitted
    pub fn apply(&mut self, evaluation: RuleEvaluation, now: Timestamp) -> bool {
        match evaluation {
            RuleEvaluation::Ok | RuleEvaluation::Exceeding => false,
            RuleEvaluation::Suppressed => {
                self.currently_breached = true;
                false
            }
            RuleEvaluation::StartsToExceed => {
                self.currently_breached = true;
                self.last_fired_at = Some(now);
                true
            }
            RuleEvaluation::BackToOk => {
                self.currently_breached = false;
                false
            }
        }
    }
}

/// Rule and state pair as reported to status queries
#[derive(Debug, Clone, PartialEq)]
pub struct RuleStatus {
    pub rule: AlertRule,
    pub state: RuleState,
}

/// Evaluates snapshots against a fixed rule set
///
/// Single owner of every [`RuleState`]; only the alert actor drives it.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    rules: Vec<(AlertRule, RuleState)>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|rule| (rule, RuleState::default()))
                .collect(),
        }
    }

    /// Evaluate all rules in configuration order
    pub fn evaluate(&mut self, snapshot: &Snapshot) -> Vec<Alert> {
        let now = snapshot.timestamp;
        let mut alerts = vec![];

        for (rule, state) in &mut self.rules {
            let value = snapshot.value(rule.metric);
            let evaluation =
                RuleEvaluation::evaluate(value, rule.threshold, state, now, rule.cooldown());

            trace!(
                "{}: {value} (max: {}) -> {evaluation:?}",
                rule.metric, rule.threshold
            );

            if state.apply(evaluation, now) {
                debug!("{}: exceeded threshold ({value} > {})", rule.metric, rule.threshold);
                alerts.push(Alert {
                    timestamp: now,
                    kind: rule.metric,
                    severity: rule.severity,
                    message: rule.message(value),
                    value,
                });
            } else if evaluation == RuleEvaluation::BackToOk {
                debug!("{}: back to normal ({value})", rule.metric);
            }
        }

        alerts
    }

    pub fn statuses(&self) -> Vec<RuleStatus> {
        self.rules
            .iter()
            .map(|(rule, state)| RuleStatus {
                rule: rule.clone(),
                state: *state,
            })
            .collect()
    }
}
