//! Replay serialization state and derived menu enablement.

use serde::{Deserialize, Serialize};

use crate::types::RequestId;

/// Whether a replay currently owns the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayState {
    #[default]
    Idle,
    Replaying { request_id: RequestId },
}

impl ReplayState {
    pub fn is_busy(&self) -> bool {
        matches!(self, ReplayState::Replaying { .. })
    }

    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            ReplayState::Idle => None,
            ReplayState::Replaying { request_id } => Some(*request_id),
        }
    }
}

/// What happens to a replay requested while another one runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayPolicy {
    /// Fail fast with `ReplayInProgress`.
    #[default]
    Reject,
    /// Run after the current one, in request order.
    Queue,
}

/// Enablement of the items that mutate the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuState {
    pub filter: bool,
    pub sort: bool,
    pub shuffle: bool,
    pub sample: bool,
    pub edit_history: bool,
}

impl MenuState {
    /// A pending line-group operation or a running replay disables every
    /// mutating item.
    pub fn compute(line_group_locked: bool, replay: ReplayState) -> Self {
        let enabled = !line_group_locked && !replay.is_busy();
        Self {
            filter: enabled,
            sort: enabled,
            shuffle: enabled,
            sample: enabled,
            edit_history: enabled,
        }
    }

    pub fn all_enabled(&self) -> bool {
        self.filter && self.sort && self.shuffle && self.sample && self.edit_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_or_replay_disables_menu() {
        assert!(MenuState::compute(false, ReplayState::Idle).all_enabled());
        let locked = MenuState::compute(true, ReplayState::Idle);
        assert!(!locked.filter && !locked.sample);
        let busy = MenuState::compute(false, ReplayState::Replaying { request_id: 3 });
        assert!(!busy.edit_history);
    }

    #[test]
    fn policy_reads_snake_case() {
        let policy: ReplayPolicy = serde_json::from_str("\"queue\"").expect("decode");
        assert_eq!(policy, ReplayPolicy::Queue);
        assert_eq!(ReplayPolicy::default(), ReplayPolicy::Reject);
    }
}
