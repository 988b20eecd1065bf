use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// The three user-initiated capture-and-submit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Register,
    Verify,
    Analyze,
}

impl OperationKind {
    pub const ALL: &[OperationKind] = &[
        OperationKind::Register,
        OperationKind::Verify,
        OperationKind::Analyze,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Register => "register",
            OperationKind::Verify => "verify",
            OperationKind::Analyze => "analyze",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "register" => Ok(OperationKind::Register),
            "verify" => Ok(OperationKind::Verify),
            "analyze" | "analyse" => Ok(OperationKind::Analyze),
            other => Err(format!(
                "unknown operation '{other}' (expected register, verify or analyze)"
            )),
        }
    }
}
