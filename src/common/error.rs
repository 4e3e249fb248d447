use thiserror::Error;

/// Per-candidate failure taxonomy for the sandbox tester.
///
/// None of these abort the pipeline: build failures and duplicates drop the
/// candidate, mode-level failures degrade that one test mode only.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("descriptor build failed: {0}")]
    BuildFailed(String),

    #[error("duplicate account detected")]
    Duplicate,

    #[error("engine error: {0}")]
    Engine(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("cancelled")]
    Cancelled,
}

impl SandboxError {
    /// Duplicates are a normal filtering outcome, not a failure worth
    /// surfacing to the operator.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, SandboxError::Duplicate)
    }

    pub fn kind(&self) -> SandboxErrorKind {
        match self {
            SandboxError::BuildFailed(_) => SandboxErrorKind::BuildFailed,
            SandboxError::Duplicate => SandboxErrorKind::Duplicate,
            SandboxError::Engine(_) => SandboxErrorKind::Engine,
            SandboxError::Probe(_) => SandboxErrorKind::Probe,
            SandboxError::Timeout(_) => SandboxErrorKind::Timeout,
            SandboxError::Cancelled => SandboxErrorKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxErrorKind {
    BuildFailed,
    Duplicate,
    Engine,
    Probe,
    Timeout,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_is_not_an_error_worth_reporting() {
        assert!(SandboxError::Duplicate.is_duplicate());
        assert!(!SandboxError::Engine("boom".into()).is_duplicate());
    }

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            SandboxError::BuildFailed("x".into()).kind(),
            SandboxErrorKind::BuildFailed
        );
        assert_eq!(SandboxError::Cancelled.kind(), SandboxErrorKind::Cancelled);
    }
}
