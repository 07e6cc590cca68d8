//! Flow state machine.
//!
//! ```text
//! Idle → FingerprintComputed → CacheChecked ─hit──→ Done
//!                                   │miss
//!                                   ▼
//!            ┌──── Executing(stage) → Validating(stage) → Rejected(stage) → Failed
//!            │                              │
//!            │                              ▼
//!            └─(site)── Accepted(document)  Accepted(site) → Persisting → Done
//!                              └──────────────────────────→ Persisting
//! ```
//!
//! Any non-terminal state may move to `Failed` when the run errors. The site
//! stage can only start from `Accepted(Document)`, so it never sees
//! unvalidated document output.

use std::fmt;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::FlowError;
use crate::flow::fingerprint::Fingerprint;
use crate::models::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    FingerprintComputed,
    CacheChecked,
    Executing(Stage),
    Validating(Stage),
    Accepted(Stage),
    Rejected(Stage),
    Persisting,
    Done,
    Failed,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Done | FlowState::Failed)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Idle => f.write_str("idle"),
            FlowState::FingerprintComputed => f.write_str("fingerprint_computed"),
            FlowState::CacheChecked => f.write_str("cache_checked"),
            FlowState::Executing(stage) => write!(f, "executing({stage})"),
            FlowState::Validating(stage) => write!(f, "validating({stage})"),
            FlowState::Accepted(stage) => write!(f, "accepted({stage})"),
            FlowState::Rejected(stage) => write!(f, "rejected({stage})"),
            FlowState::Persisting => f.write_str("persisting"),
            FlowState::Done => f.write_str("done"),
            FlowState::Failed => f.write_str("failed"),
        }
    }
}

/// Whether `from → to` is a legal transition.
pub fn is_allowed(from: FlowState, to: FlowState) -> bool {
    use FlowState::*;

    if to == Failed {
        return !from.is_terminal();
    }
    match (from, to) {
        (Idle, FingerprintComputed) => true,
        (FingerprintComputed, CacheChecked) => true,
        (CacheChecked, Done) => true,
        (CacheChecked, Executing(Stage::Document)) => true,
        (Executing(a), Validating(b)) => a == b,
        (Validating(a), Accepted(b)) | (Validating(a), Rejected(b)) => a == b,
        (Accepted(Stage::Document), Executing(Stage::Site)) => true,
        (Accepted(_), Persisting) => true,
        (Persisting, Done) => true,
        _ => false,
    }
}

/// Tracks one run's state and the path it took.
#[derive(Debug)]
pub struct RunMachine {
    run_id: Uuid,
    fingerprint: Option<Fingerprint>,
    state: FlowState,
    history: Vec<FlowState>,
}

impl RunMachine {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            fingerprint: None,
            state: FlowState::Idle,
            history: vec![FlowState::Idle],
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    pub fn set_fingerprint(&mut self, fingerprint: Fingerprint) {
        self.fingerprint = Some(fingerprint);
    }

    pub fn advance(&mut self, to: FlowState) -> Result<(), FlowError> {
        if !is_allowed(self.state, to) {
            return Err(FlowError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        debug!(
            run_id = %self.run_id,
            fingerprint = self.fingerprint.as_ref().map(|f| f.short()).unwrap_or("-"),
            from = %self.state,
            to = %to,
            "flow transition"
        );
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Moves to `Failed` unless the run already ended.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = FlowState::Failed;
            self.history.push(FlowState::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FlowState::*;

    #[test]
    fn test_full_publish_path_is_legal() {
        let mut machine = RunMachine::new(Uuid::new_v4());
        for next in [
            FingerprintComputed,
            CacheChecked,
            Executing(Stage::Document),
            Validating(Stage::Document),
            Accepted(Stage::Document),
            Executing(Stage::Site),
            Validating(Stage::Site),
            Accepted(Stage::Site),
            Persisting,
            Done,
        ] {
            machine.advance(next).unwrap();
        }
        assert_eq!(machine.history().len(), 11);
        assert_eq!(machine.state(), Done);
    }

    #[test]
    fn test_site_cannot_start_from_unaccepted_document() {
        assert!(!is_allowed(Validating(Stage::Document), Executing(Stage::Site)));
        assert!(!is_allowed(Rejected(Stage::Document), Executing(Stage::Site)));
        assert!(!is_allowed(CacheChecked, Executing(Stage::Site)));
        assert!(!is_allowed(Executing(Stage::Document), Validating(Stage::Site)));
    }

    #[test]
    fn test_rejected_only_leads_to_failed() {
        assert!(!is_allowed(Rejected(Stage::Document), Persisting));
        assert!(is_allowed(Rejected(Stage::Document), Failed));
    }

    #[test]
    fn test_illegal_transition_is_an_error() {
        let mut machine = RunMachine::new(Uuid::new_v4());
        let err = machine.advance(Persisting).unwrap_err();
        assert!(matches!(err, FlowError::IllegalTransition { from: Idle, to: Persisting }));
        assert_eq!(machine.state(), Idle);
    }

    #[test]
    fn test_fail_is_idempotent_and_respects_terminal_states() {
        let mut machine = RunMachine::new(Uuid::new_v4());
        machine.fail();
        machine.fail();
        assert_eq!(machine.history(), &[Idle, Failed]);
        assert!(!is_allowed(Done, Failed));
    }
}
