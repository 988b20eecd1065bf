use serde::Serialize;

use crate::workflow::domain::operation_kind::OperationKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterOutcome {
    pub succeeded: bool,
}

/// `succeeded == false` is a negative verdict ("not you"), not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyOutcome {
    pub succeeded: bool,
    pub identity_label: Option<String>,
}

impl VerifyOutcome {
    pub fn verified() -> Self {
        Self {
            succeeded: true,
            identity_label: None,
        }
    }

    pub fn not_verified() -> Self {
        Self {
            succeeded: false,
            identity_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzeOutcome {
    pub succeeded: bool,
    pub summaries: Vec<String>,
}

/// The result of whichever operation completed last.
///
/// Holding all three in one slot is what keeps them mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Outcome {
    Registration(RegisterOutcome),
    Verification(VerifyOutcome),
    Analysis(AnalyzeOutcome),
}

impl Outcome {
    pub fn kind(&self) -> OperationKind {
        match self {
            Outcome::Registration(_) => OperationKind::Register,
            Outcome::Verification(_) => OperationKind::Verify,
            Outcome::Analysis(_) => OperationKind::Analyze,
        }
    }

    pub fn succeeded(&self) -> bool {
        match self {
            Outcome::Registration(o) => o.succeeded,
            Outcome::Verification(o) => o.succeeded,
            Outcome::Analysis(o) => o.succeeded,
        }
    }
}

impl From<RegisterOutcome> for Outcome {
    fn from(outcome: RegisterOutcome) -> Self {
        Outcome::Registration(outcome)
    }
}

impl From<VerifyOutcome> for Outcome {
    fn from(outcome: VerifyOutcome) -> Self {
        Outcome::Verification(outcome)
    }
}

impl From<AnalyzeOutcome> for Outcome {
    fn from(outcome: AnalyzeOutcome) -> Self {
        Outcome::Analysis(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            Outcome::from(RegisterOutcome { succeeded: true }).kind(),
            OperationKind::Register
        );
        assert_eq!(
            Outcome::from(VerifyOutcome::verified()).kind(),
            OperationKind::Verify
        );
        assert_eq!(
            Outcome::from(AnalyzeOutcome {
                succeeded: true,
                summaries: vec![],
            })
            .kind(),
            OperationKind::Analyze
        );
    }

    #[test]
    fn test_serializes_with_operation_tag() {
        let json = serde_json::to_value(Outcome::from(VerifyOutcome::not_verified())).unwrap();
        assert_eq!(json["operation"], "verification");
        assert_eq!(json["succeeded"], false);
        assert!(json["identity_label"].is_null());
    }
}
