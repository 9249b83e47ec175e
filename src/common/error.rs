//! Error types for footstep_planner

use thiserror::Error;

/// Main error type for the footstep planner
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Malformed configuration (footstep lists, unknown heuristic or planner)
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A request could not be served in the current session state
    #[error("Precondition failed: {0}")]
    Precondition(String),
    /// The search ran but did not produce a usable plan
    #[error("Search failure: {0}")]
    SearchFailure(String),
    /// A state id that was never registered
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for PlannerError {
    fn from(e: serde_yaml::Error) -> Self {
        PlannerError::ConfigParse(e.to_string())
    }
}

/// Result type alias for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlannerError::SearchFailure("No solution found".to_string());
        assert_eq!(format!("{}", err), "Search failure: No solution found");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlannerError = io_err.into();
        assert!(matches!(err, PlannerError::Io(_)));
    }
}
