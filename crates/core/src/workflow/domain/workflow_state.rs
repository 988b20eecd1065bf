use serde::Serialize;
use thiserror::Error;

use crate::gateway::domain::service_response::FailureReason;
use crate::workflow::domain::operation_kind::OperationKind;
use crate::workflow::domain::outcome::{AnalyzeOutcome, Outcome, RegisterOutcome, VerifyOutcome};

/// An illegal transition. The state is left exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{requested} cannot begin while {active} is in flight")]
    AlreadyActive {
        requested: OperationKind,
        active: OperationKind,
    },
    #[error("{0} completed but nothing was in flight")]
    NotActive(OperationKind),
    #[error("{completed} completed but {active} is in flight")]
    KindMismatch {
        completed: OperationKind,
        active: OperationKind,
    },
}

/// The failure shown in the error banner, tagged with the operation that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorNotice {
    pub operation: OperationKind,
    pub reason: FailureReason,
}

impl ErrorNotice {
    pub fn message(&self) -> String {
        self.reason.to_string()
    }
}

/// Single source of truth for what the client shows.
///
/// `Idle -> {Registering, Verifying, Analyzing} -> Idle`. At most one
/// operation is active, and only the most recent outcome is kept: the
/// three result views are projections of one slot, so a stale result
/// from a different operation can never sit next to a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowState {
    active: Option<OperationKind>,
    outcome: Option<Outcome>,
    last_error: Option<ErrorNotice>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_operation(&self) -> Option<OperationKind> {
        self.active
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn registration(&self) -> Option<&RegisterOutcome> {
        match &self.outcome {
            Some(Outcome::Registration(o)) => Some(o),
            _ => None,
        }
    }

    pub fn verification(&self) -> Option<&VerifyOutcome> {
        match &self.outcome {
            Some(Outcome::Verification(o)) => Some(o),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&AnalyzeOutcome> {
        match &self.outcome {
            Some(Outcome::Analysis(o)) => Some(o),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&ErrorNotice> {
        self.last_error.as_ref()
    }

    /// `Idle -> kind`. Clears the error banner.
    pub fn begin(&mut self, kind: OperationKind) -> Result<(), TransitionError> {
        if let Some(active) = self.active {
            return Err(TransitionError::AlreadyActive {
                requested: kind,
                active,
            });
        }
        self.active = Some(kind);
        self.last_error = None;
        Ok(())
    }

    /// `kind -> Idle`, replacing whatever result was shown before.
    pub fn complete_success(
        &mut self,
        kind: OperationKind,
        outcome: Outcome,
    ) -> Result<(), TransitionError> {
        self.ensure_active(kind)?;
        if outcome.kind() != kind {
            return Err(TransitionError::KindMismatch {
                completed: outcome.kind(),
                active: kind,
            });
        }
        self.outcome = Some(outcome);
        self.active = None;
        Ok(())
    }

    /// `kind -> Idle` with the failure in the error banner.
    ///
    /// A failed verification is also rendered as an explicit "not verified"
    /// result; failed registrations and analyses leave the previous result
    /// alone.
    pub fn complete_failure(
        &mut self,
        kind: OperationKind,
        reason: FailureReason,
    ) -> Result<(), TransitionError> {
        self.ensure_active(kind)?;
        if kind == OperationKind::Verify {
            self.outcome = Some(Outcome::Verification(VerifyOutcome::not_verified()));
        }
        self.last_error = Some(ErrorNotice {
            operation: kind,
            reason,
        });
        self.active = None;
        Ok(())
    }

    fn ensure_active(&self, kind: OperationKind) -> Result<(), TransitionError> {
        match self.active {
            None => Err(TransitionError::NotActive(kind)),
            Some(active) if active != kind => Err(TransitionError::KindMismatch {
                completed: kind,
                active,
            }),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    // --- Helpers ---

    fn registered() -> Outcome {
        RegisterOutcome { succeeded: true }.into()
    }

    fn analyzed(summaries: &[&str]) -> Outcome {
        AnalyzeOutcome {
            succeeded: true,
            summaries: summaries.iter().map(|s| s.to_string()).collect(),
        }
        .into()
    }

    fn success_for(kind: OperationKind) -> Outcome {
        match kind {
            OperationKind::Register => registered(),
            OperationKind::Verify => VerifyOutcome::verified().into(),
            OperationKind::Analyze => analyzed(&["30 years old"]),
        }
    }

    fn populated_results(state: &WorkflowState) -> usize {
        [
            state.registration().is_some(),
            state.verification().is_some(),
            state.analysis().is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    // --- Tests ---

    #[test]
    fn test_new_state_is_idle_and_empty() {
        let state = WorkflowState::new();
        assert!(state.is_idle());
        assert!(state.outcome().is_none());
        assert!(state.last_error().is_none());
        assert_eq!(populated_results(&state), 0);
    }

    #[rstest]
    #[case::register(OperationKind::Register)]
    #[case::verify(OperationKind::Verify)]
    #[case::analyze(OperationKind::Analyze)]
    fn test_begin_sets_active(#[case] kind: OperationKind) {
        let mut state = WorkflowState::new();
        state.begin(kind).unwrap();
        assert_eq!(state.active_operation(), Some(kind));
        assert!(!state.is_idle());
    }

    #[test]
    fn test_begin_while_active_is_rejected_without_change() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Register).unwrap();
        let before = state.clone();

        let err = state.begin(OperationKind::Verify).unwrap_err();
        assert_eq!(
            err,
            TransitionError::AlreadyActive {
                requested: OperationKind::Verify,
                active: OperationKind::Register,
            }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_begin_clears_last_error() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Register).unwrap();
        state
            .complete_failure(OperationKind::Register, FailureReason::transport("down"))
            .unwrap();
        assert!(state.last_error().is_some());

        state.begin(OperationKind::Analyze).unwrap();
        assert!(state.last_error().is_none());
    }

    #[rstest]
    #[case::register(OperationKind::Register)]
    #[case::verify(OperationKind::Verify)]
    #[case::analyze(OperationKind::Analyze)]
    fn test_success_returns_to_idle_with_single_result(#[case] kind: OperationKind) {
        let mut state = WorkflowState::new();
        state.begin(kind).unwrap();
        state.complete_success(kind, success_for(kind)).unwrap();

        assert!(state.is_idle());
        assert_eq!(populated_results(&state), 1);
        assert_eq!(state.outcome().map(Outcome::kind), Some(kind));
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_success_replaces_previous_result() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Verify).unwrap();
        state
            .complete_success(OperationKind::Verify, VerifyOutcome::verified().into())
            .unwrap();

        state.begin(OperationKind::Analyze).unwrap();
        state
            .complete_success(OperationKind::Analyze, analyzed(&["a", "b"]))
            .unwrap();

        assert!(state.verification().is_none());
        assert!(state.registration().is_none());
        assert_eq!(state.analysis().unwrap().summaries, vec!["a", "b"]);
    }

    #[test]
    fn test_verify_failure_sets_not_verified_and_error() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Analyze).unwrap();
        state
            .complete_success(OperationKind::Analyze, analyzed(&["x"]))
            .unwrap();

        state.begin(OperationKind::Verify).unwrap();
        state
            .complete_failure(
                OperationKind::Verify,
                FailureReason::rejected(401, "Face does not match"),
            )
            .unwrap();

        assert!(state.is_idle());
        assert_eq!(state.verification(), Some(&VerifyOutcome::not_verified()));
        assert!(state.analysis().is_none());
        let notice = state.last_error().unwrap();
        assert_eq!(notice.operation, OperationKind::Verify);
        assert_eq!(notice.message(), "Face does not match");
    }

    #[rstest]
    #[case::register(OperationKind::Register)]
    #[case::analyze(OperationKind::Analyze)]
    fn test_other_failures_only_set_error(#[case] kind: OperationKind) {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Verify).unwrap();
        state
            .complete_success(OperationKind::Verify, VerifyOutcome::verified().into())
            .unwrap();

        state.begin(kind).unwrap();
        state
            .complete_failure(kind, FailureReason::transport("timed out"))
            .unwrap();

        assert!(state.is_idle());
        assert_eq!(state.verification(), Some(&VerifyOutcome::verified()));
        assert_eq!(populated_results(&state), 1);
        assert_eq!(state.last_error().unwrap().message(), "timed out");
    }

    #[test]
    fn test_first_failure_leaves_results_empty() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Analyze).unwrap();
        state
            .complete_failure(OperationKind::Analyze, FailureReason::NoFaceDetected)
            .unwrap();
        assert_eq!(populated_results(&state), 0);
        assert_eq!(
            state.last_error().unwrap().reason,
            FailureReason::NoFaceDetected
        );
    }

    #[test]
    fn test_completion_without_begin_is_rejected() {
        let mut state = WorkflowState::new();
        assert_eq!(
            state.complete_success(OperationKind::Register, registered()),
            Err(TransitionError::NotActive(OperationKind::Register))
        );
        assert_eq!(
            state.complete_failure(OperationKind::Verify, FailureReason::NoFaceDetected),
            Err(TransitionError::NotActive(OperationKind::Verify))
        );
        assert_eq!(state, WorkflowState::new());
    }

    #[test]
    fn test_completion_for_wrong_kind_is_rejected() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Register).unwrap();
        let before = state.clone();

        let err = state
            .complete_failure(OperationKind::Verify, FailureReason::transport("x"))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::KindMismatch {
                completed: OperationKind::Verify,
                active: OperationKind::Register,
            }
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_outcome_must_match_active_kind() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Register).unwrap();
        let before = state.clone();

        let err = state
            .complete_success(OperationKind::Register, analyzed(&["x"]))
            .unwrap_err();
        assert!(matches!(err, TransitionError::KindMismatch { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_results_stay_mutually_exclusive_over_all_sequences() {
        // Every sequence of three operations, each either succeeding or failing.
        let steps: Vec<(OperationKind, bool)> = OperationKind::ALL
            .iter()
            .flat_map(|k| [(*k, true), (*k, false)])
            .collect();

        for a in &steps {
            for b in &steps {
                for c in &steps {
                    let mut state = WorkflowState::new();
                    for (kind, ok) in [a, b, c] {
                        state.begin(*kind).unwrap();
                        if *ok {
                            state.complete_success(*kind, success_for(*kind)).unwrap();
                        } else {
                            state
                                .complete_failure(*kind, FailureReason::transport("x"))
                                .unwrap();
                        }
                        assert!(state.is_idle());
                        assert!(populated_results(&state) <= 1);
                        if *ok {
                            assert_eq!(state.outcome().map(Outcome::kind), Some(*kind));
                            assert!(state.last_error().is_none());
                        } else {
                            assert!(state.last_error().is_some());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_serializes_for_rendering() {
        let mut state = WorkflowState::new();
        state.begin(OperationKind::Verify).unwrap();
        state
            .complete_failure(OperationKind::Verify, FailureReason::rejected(400, "no face"))
            .unwrap();

        let json = serde_json::to_value(&state).unwrap();
        assert!(json["active"].is_null());
        assert_eq!(json["outcome"]["operation"], "verification");
        assert_eq!(json["outcome"]["succeeded"], false);
        assert_eq!(json["last_error"]["operation"], "verify");
        assert_eq!(json["last_error"]["reason"]["message"], "no face");
    }
}
