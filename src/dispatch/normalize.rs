use crate::dispatch::{
    fault::ExecutionFault,
    models::{ExecutionResult, RawOutcome},
};

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Code executed successfully";
pub const UNKNOWN_REMOTE_ERROR: &str = "Unknown error";

/// Single home of the success predicate shared by every runner.
pub struct ResultNormalizer;

impl ResultNormalizer {
    pub fn normalize(outcome: Result<RawOutcome, ExecutionFault>) -> ExecutionResult {
        match outcome {
            Ok(raw) => Self::from_streams(raw),
            Err(fault) => Self::from_fault(fault),
        }
    }

    /// Success iff nothing reached stderr. Output prefers stdout, then
    /// stderr, then the generic success message.
    pub fn from_streams(raw: RawOutcome) -> ExecutionResult {
        let success = raw.stderr.is_empty();
        let output = first_non_empty([raw.stdout, raw.stderr])
            .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string());

        ExecutionResult {
            success,
            output,
            error: None,
        }
    }

    pub fn from_fault(fault: ExecutionFault) -> ExecutionResult {
        let error = fault.to_string();
        match fault {
            ExecutionFault::Evaluation { message, trace } => {
                let output = first_non_empty([trace]).unwrap_or_else(|| message.clone());
                ExecutionResult::failed(message, output)
            }
            ExecutionFault::Process { message, stderr } => {
                let output = first_non_empty([stderr]).unwrap_or_else(|| message.clone());
                ExecutionResult::failed(message, output)
            }
            ExecutionFault::RemoteMissingRun { detail } => ExecutionResult::failed(
                error,
                detail
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| UNKNOWN_REMOTE_ERROR.to_string()),
            ),
            ExecutionFault::Remote(_)
            | ExecutionFault::Artifact(_)
            | ExecutionFault::Timeout(_)
            | ExecutionFault::Internal(_) => ExecutionResult::failed(error.clone(), error),
        }
    }
}

fn first_non_empty<const N: usize>(candidates: [String; N]) -> Option<String> {
    candidates.into_iter().find(|s| !s.is_empty())
}
