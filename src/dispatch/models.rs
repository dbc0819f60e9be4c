use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub code: String,
    pub language: String,
    /// Display only. Never used to build a path.
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub stdin: String,
}

#[cfg(test)]
impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            file_name: String::new(),
            stdin: String::new(),
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }
}

/// Canonical `{success, output, error}` shape every runner converges to.
///
/// Callers display `output` in preference to `error`, so failed results still
/// carry whatever diagnostic text was available in `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failed(error: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
        }
    }
}

/// Raw stream pair produced by a runner before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawOutcome {
    pub stdout: String,
    pub stderr: String,
}

impl RawOutcome {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecutionRequest, ExecutionResult};

    #[test]
    fn request_defaults_optional_fields() {
        let request: ExecutionRequest =
            serde_json::from_str(r#"{"code":"print(1)","language":"python"}"#).unwrap();
        assert_eq!(request.file_name, "");
        assert_eq!(request.stdin, "");
    }

    #[test]
    fn request_reads_camel_case_file_name() {
        let request: ExecutionRequest = serde_json::from_str(
            r#"{"code":"","language":"go","fileName":"main.go","stdin":"1 2"}"#,
        )
        .unwrap();
        assert_eq!(request.file_name, "main.go");
        assert_eq!(request.stdin, "1 2");
    }

    #[test]
    fn successful_result_omits_error_field() {
        let result = ExecutionResult {
            success: true,
            output: "ok".to_string(),
            error: None,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "output": "ok" }));
    }

    #[test]
    fn failed_result_carries_both_texts() {
        let json = serde_json::to_value(ExecutionResult::failed("boom", "trace")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "output": "trace", "error": "boom" })
        );
    }
}
