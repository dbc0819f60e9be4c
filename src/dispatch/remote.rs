use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dispatch::{
    Runner,
    fault::ExecutionFault,
    language::remote_language,
    models::{ExecutionRequest, RawOutcome},
};

#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    language: &'a str,
    version: &'static str,
    files: [RemoteFile<'a>; 1],
    stdin: &'a str,
}

#[derive(Debug, Serialize)]
struct RemoteFile<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    #[serde(default)]
    run: Option<RemoteStage>,
    #[serde(default)]
    compile: Option<RemoteStage>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RemoteStage {
    #[serde(default)]
    output: String,
    #[serde(default)]
    stderr: String,
}

/// Forwards everything the local runners don't cover to a third-party
/// multi-language execution service.
pub struct RemoteExecutionProxy {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl RemoteExecutionProxy {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExecutionFault> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

#[async_trait]
impl Runner for RemoteExecutionProxy {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn run(&self, request: ExecutionRequest) -> Result<RawOutcome, ExecutionFault> {
        let language = remote_language(&request.language);
        let body = RemoteRequest {
            language,
            version: "*",
            files: [RemoteFile {
                content: &request.code,
            }],
            stdin: &request.stdin,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        tracing::debug!(language, status = %status, bytes = bytes.len(), "remote execution responded");

        let parsed: RemoteResponse = serde_json::from_slice(&bytes).map_err(|err| {
            ExecutionFault::Remote(format!(
                "invalid response from execution service ({status}): {err}"
            ))
        })?;

        match parsed.run {
            Some(run) => Ok(RawOutcome::new(run.output, run.stderr)),
            None => {
                let compile_detail = parsed
                    .compile
                    .map(|c| if c.stderr.is_empty() { c.output } else { c.stderr })
                    .filter(|d| !d.is_empty());
                Err(ExecutionFault::RemoteMissingRun {
                    detail: compile_detail.or(parsed.message),
                })
            }
        }
    }
}
