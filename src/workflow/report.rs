use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::item::Step;
use crate::error::IngestError;

/// Furthest point a period reached. Advances one step at a time and never
/// moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Pending,
    Fetched,
    Uploaded,
    Cleaned,
}

impl Stage {
    /// Stage reached once `step` succeeds.
    pub fn after(step: Step) -> Stage {
        match step {
            Step::Fetch => Stage::Fetched,
            Step::Upload => Stage::Uploaded,
            Step::Cleanup => Stage::Cleaned,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub period: String,
    pub stage: Stage,
    /// Attempts per step that ran, retries included.
    pub attempts: BTreeMap<Step, u32>,
    pub bytes: u64,
    pub failed_step: Option<Step>,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ItemReport {
    pub fn new(period: &str) -> Self {
        Self {
            period: period.to_string(),
            stage: Stage::Pending,
            attempts: BTreeMap::new(),
            bytes: 0,
            failed_step: None,
            http_status: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_attempts(&mut self, step: Step, attempts: u32) {
        self.attempts.insert(step, attempts);
    }

    pub fn attempts_for(&self, step: Step) -> u32 {
        self.attempts.get(&step).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.values().sum()
    }

    pub fn advance(&mut self, step: Step) {
        self.stage = Stage::after(step);
    }

    pub fn fail(mut self, step: Step, err: &anyhow::Error) -> Self {
        self.failed_step = Some(step);
        self.http_status = err
            .downcast_ref::<IngestError>()
            .and_then(IngestError::status);
        self.error = Some(format!("{:#}", err));
        self.finish()
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.stage == Stage::Cleaned
    }
}
