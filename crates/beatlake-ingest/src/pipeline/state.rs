use serde::{Deserialize, Serialize};

/// Phase of an ingestion run.
///
/// A run enters a phase before doing its work, so a run that fails while
/// acquiring credentials fails in `Authenticated`. Phases only move forward;
/// `Failed` can be entered from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Authenticated,
    Searching,
    Reconciling,
    Fetching,
    Merging,
    Publishing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Init => "init",
            RunState::Authenticated => "authenticated",
            RunState::Searching => "searching",
            RunState::Reconciling => "reconciling",
            RunState::Fetching => "fetching",
            RunState::Merging => "merging",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
