//! Alert state and deduplication
//!
//! Decides whether a finding should be notified now, keyed by
//! (symbol, indicator, signal type):
//! - no record: allow
//! - record older than the cooldown: allow
//! - inside the cooldown: allow only on a significant change of `z_score`
//!   or of a percentage `*change*` field versus the stored finding
//!
//! History is in-memory only and is lost on restart.

#[cfg(test)]
mod tests;

use crate::config::StateConfig;
use crate::error::{MonitorError, Result};
use crate::types::{Finding, Indicator, PrimarySignal};
use crate::utils::parse_pct;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub symbol: String,
    pub indicator: Indicator,
    pub signal_type: String,
}

impl AlertKey {
    pub fn new(symbol: &str, finding: &Finding) -> Self {
        Self {
            symbol: symbol.to_string(),
            indicator: finding.indicator(),
            signal_type: finding.signal_type().to_string(),
        }
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.symbol, self.indicator, self.signal_type)
    }
}

/// Last notification sent for a key
#[derive(Debug, Clone)]
pub struct AlertRecord {
    pub sent_at: DateTime<Utc>,
    pub finding: Finding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    FirstSeen,
    CooldownExpired,
    SignificantChange,
    Suppressed,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub allow: bool,
    /// Previously notified finding for this key, returned on allow and deny
    pub previous: Option<Finding>,
    pub reason: DecisionReason,
}

pub struct AlertStateManager {
    records: Mutex<HashMap<AlertKey, AlertRecord>>,
    cooldown: Duration,
    z_score_change: f64,
    percentage_change: f64,
}

impl AlertStateManager {
    pub fn new(config: &StateConfig) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            cooldown: Duration::try_minutes(config.cooldown_minutes).unwrap_or(Duration::MAX),
            z_score_change: config.z_score_change,
            percentage_change: config.percentage_change,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Decide at the current wall-clock time
    pub fn decide(&self, symbol: &str, finding: &Finding) -> Decision {
        self.decide_at(symbol, finding, Utc::now())
    }

    /// Decide as of `now`. The whole read-modify-write runs under one lock.
    pub fn decide_at(&self, symbol: &str, finding: &Finding, now: DateTime<Utc>) -> Decision {
        let key = AlertKey::new(symbol, finding);
        let mut records = self.records.lock();

        let Some(record) = records.get(&key) else {
            info!("[State] New signal {}, allowing", key);
            records.insert(key, AlertRecord { sent_at: now, finding: finding.clone() });
            return Decision {
                allow: true,
                previous: None,
                reason: DecisionReason::FirstSeen,
            };
        };

        let previous = record.finding.clone();

        if now - record.sent_at >= self.cooldown {
            info!("[State] {} past cooldown, allowing", key);
            records.insert(key, AlertRecord { sent_at: now, finding: finding.clone() });
            return Decision {
                allow: true,
                previous: Some(previous),
                reason: DecisionReason::CooldownExpired,
            };
        }

        match self.significant_change(&previous.primary_signal, &finding.primary_signal) {
            Ok(true) => {
                info!("[State] {} changed significantly inside cooldown, allowing", key);
                records.insert(key, AlertRecord { sent_at: now, finding: finding.clone() });
                Decision {
                    allow: true,
                    previous: Some(previous),
                    reason: DecisionReason::SignificantChange,
                }
            }
            Ok(false) => {
                debug!("[State] {} in cooldown without significant change, suppressed", key);
                Decision {
                    allow: false,
                    previous: Some(previous),
                    reason: DecisionReason::Suppressed,
                }
            }
            Err(e) => {
                warn!("[State] {}: {}; suppressing", key, e);
                Decision {
                    allow: false,
                    previous: Some(previous),
                    reason: DecisionReason::Suppressed,
                }
            }
        }
    }

    /// Whether `current` differs enough from `previous` to re-alert.
    ///
    /// `Err(StateCorruption)` when comparable fields exist but none of them
    /// could be parsed on both sides.
    pub fn significant_change(&self, previous: &PrimarySignal, current: &PrimarySignal) -> Result<bool> {
        let mut attempted = 0usize;
        let mut compared = 0usize;
        let mut failures = Vec::new();

        for (name, value) in &current.fields {
            let (parse, threshold) = if name == "z_score" {
                (parse_number as fn(&str) -> Option<f64>, self.z_score_change)
            } else if name.contains("change") {
                (parse_pct as fn(&str) -> Option<f64>, self.percentage_change)
            } else {
                continue;
            };

            attempted += 1;
            let old = previous.field(name).and_then(parse);
            let new = parse(value);
            match (old, new) {
                (Some(old), Some(new)) => {
                    compared += 1;
                    if (new - old).abs() > threshold {
                        debug!("{}: {} -> {} exceeds {}", name, old, new, threshold);
                        return Ok(true);
                    }
                }
                _ => failures.push(format!(
                    "{}: {:?} -> {:?}",
                    name,
                    previous.field(name),
                    value
                )),
            }
        }

        if attempted > 0 && compared == 0 {
            return Err(MonitorError::StateCorruption(format!(
                "no comparable fields ({})",
                failures.join(", ")
            )));
        }
        Ok(false)
    }

    /// Drop records older than twice the cooldown
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let horizon = self.cooldown.checked_mul(2).unwrap_or(Duration::MAX);
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|_, r| now - r.sent_at < horizon);
        before - records.len()
    }

    pub fn record(&self, key: &AlertKey) -> Option<AlertRecord> {
        self.records.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then_some(value)
}
