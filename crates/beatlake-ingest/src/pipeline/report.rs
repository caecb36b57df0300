use super::RunState;
use crate::error::ApiError;
use crate::storage::SaveOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// Records retrieved by one sub-query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubQueryReport {
    pub label: String,
    pub records: usize,
    /// False when the sub-query ended on an error
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub dataset: String,
    pub records: usize,
    pub outcome: SaveOutcome,
}

/// A failure that was logged and skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub phase: RunState,
    pub target: String,
    pub status: Option<u16>,
    pub message: String,
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: String,
    pub state: RunState,
    /// Phase the run was in when it failed
    pub failed_in: Option<RunState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sub_queries: Vec<SubQueryReport>,
    pub discovered: usize,
    pub missing: usize,
    pub fetched: usize,
    pub published: Vec<PublishReport>,
    pub failures: Vec<FailureReport>,
    /// Rate limit or quota cut the run short
    pub rate_limited: bool,
}

impl RunReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            source: source.into(),
            state: RunState::Init,
            failed_in: None,
            started_at: Utc::now(),
            finished_at: None,
            sub_queries: Vec::new(),
            discovered: 0,
            missing: 0,
            fetched: 0,
            published: Vec::new(),
            failures: Vec::new(),
            rate_limited: false,
        }
    }

    pub(crate) fn transition(&mut self, to: RunState) {
        info!(
            run_id = %self.run_id,
            source = %self.source,
            from = %self.state,
            to = %to,
            "Run state changed"
        );
        self.state = to;
    }

    pub(crate) fn record_failure(&mut self, target: impl Into<String>, err: &ApiError) {
        let failure = FailureReport {
            phase: self.state,
            target: target.into(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        };
        warn!(
            run_id = %self.run_id,
            source = %self.source,
            phase = %failure.phase,
            target = %failure.target,
            status = ?failure.status,
            error = %failure.message,
            "Skipping after API failure"
        );
        self.failures.push(failure);
    }

    pub(crate) fn finish(&mut self) {
        self.transition(RunState::Done);
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self) {
        self.failed_in = Some(self.state);
        self.transition(RunState::Failed);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    /// Records retrieved across all sub-queries
    pub fn searched(&self) -> usize {
        self.sub_queries.iter().map(|q| q.records).sum()
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}
