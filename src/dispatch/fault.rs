use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong inside one runner invocation.
///
/// None of these escape the dispatcher; `normalize::from_fault` turns each
/// one into a failed `ExecutionResult`.
#[derive(Debug, Error)]
pub enum ExecutionFault {
    #[error("{message}")]
    Evaluation { message: String, trace: String },
    #[error("{message}")]
    Process { message: String, stderr: String },
    #[error("{0}")]
    Remote(String),
    #[error("Execution failed")]
    RemoteMissingRun { detail: Option<String> },
    #[error("artifact error: {0}")]
    Artifact(String),
    #[error("execution timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionFault {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Evaluation { .. } => "evaluation",
            Self::Process { .. } => "process",
            Self::Remote(_) | Self::RemoteMissingRun { .. } => "remote",
            Self::Artifact(_) => "artifact",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    pub fn process(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
            stderr: stderr.into(),
        }
    }
}

impl From<reqwest::Error> for ExecutionFault {
    fn from(err: reqwest::Error) -> Self {
        Self::Remote(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExecutionFault {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ExecutionFault;

    #[test]
    fn timeout_message_names_the_deadline() {
        let fault = ExecutionFault::Timeout(Duration::from_millis(2500));
        assert_eq!(fault.to_string(), "execution timed out after 2500 ms");
        assert_eq!(fault.kind(), "timeout");
    }

    #[test]
    fn remote_faults_share_a_kind() {
        assert_eq!(ExecutionFault::Remote("dns".into()).kind(), "remote");
        assert_eq!(
            ExecutionFault::RemoteMissingRun { detail: None }.kind(),
            "remote"
        );
    }
}
