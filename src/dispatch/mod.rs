pub mod fault;
pub mod inline;
pub mod language;
pub mod models;
pub mod normalize;
pub mod remote;
pub mod subprocess;
#[cfg(test)]
pub mod testing;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    config::DispatchConfig,
    dispatch::{
        fault::ExecutionFault,
        inline::{BoaSandbox, InlineLimits, LocalInlineRunner},
        language::{InterpreterSpec, PREVIEW_MESSAGE, RouteKind, route_for},
        models::{ExecutionRequest, ExecutionResult, RawOutcome},
        normalize::ResultNormalizer,
        remote::RemoteExecutionProxy,
        subprocess::SubprocessRunner,
    },
    metrics::MetricsRegistry,
};

/// A strategy able to execute code for a subset of languages.
#[async_trait]
pub trait Runner: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, request: ExecutionRequest) -> Result<RawOutcome, ExecutionFault>;
}

pub struct Runners {
    pub inline: Arc<dyn Runner>,
    pub subprocess: Arc<dyn Runner>,
    pub remote: Arc<dyn Runner>,
}

pub struct Dispatcher {
    runners: Runners,
    deadline: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl Dispatcher {
    pub fn new(runners: Runners, deadline: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            runners,
            deadline,
            metrics,
        }
    }

    pub fn from_config(
        config: &DispatchConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self, ExecutionFault> {
        let sandbox = BoaSandbox::new(InlineLimits {
            loop_iterations: config.inline.loop_iteration_limit,
            recursion_depth: config.inline.recursion_limit,
        });
        let runners = Runners {
            inline: Arc::new(LocalInlineRunner::new(Arc::new(sandbox))),
            subprocess: Arc::new(SubprocessRunner::new(
                InterpreterSpec::python(config.execution.python_bin.clone()),
                config.workspace_dir.clone(),
                config.execution.max_output_bytes,
            )),
            remote: Arc::new(RemoteExecutionProxy::new(
                config.remote.execute_url.clone(),
                config.remote.timeout,
            )?),
        };
        Ok(Self::new(runners, config.execution.timeout, metrics))
    }

    /// Runs one request through exactly one runner. Never fails: every fault
    /// comes back as a result with `success == false`.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let dispatch_id = Uuid::new_v4();
        let route = route_for(&request.language);
        let started = Instant::now();
        let _in_flight = self.metrics.started(route);

        tracing::info!(
            dispatch_id = %dispatch_id,
            language = %request.language,
            file_name = %request.file_name,
            route = route.as_str(),
            code_bytes = request.code.len(),
            stdin_bytes = request.stdin.len(),
            "dispatching execution"
        );

        let outcome = match route {
            RouteKind::Preview => Ok(RawOutcome::new(PREVIEW_MESSAGE, "")),
            RouteKind::Inline => self.run_with_deadline(&self.runners.inline, request).await,
            RouteKind::Subprocess => {
                self.run_with_deadline(&self.runners.subprocess, request)
                    .await
            }
            RouteKind::Remote => self.run_with_deadline(&self.runners.remote, request).await,
        };

        let timed_out = matches!(outcome, Err(ExecutionFault::Timeout(_)));
        if let Err(fault) = &outcome {
            tracing::warn!(
                dispatch_id = %dispatch_id,
                route = route.as_str(),
                fault = fault.kind(),
                error = %fault,
                "execution fault"
            );
        }

        let result = ResultNormalizer::normalize(outcome);
        self.metrics.finished(result.success, timed_out);

        tracing::info!(
            dispatch_id = %dispatch_id,
            route = route.as_str(),
            success = result.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "execution finished"
        );
        result
    }

    async fn run_with_deadline(
        &self,
        runner: &Arc<dyn Runner>,
        request: ExecutionRequest,
    ) -> Result<RawOutcome, ExecutionFault> {
        let runner = runner.clone();
        tracing::debug!(
            runner = runner.name(),
            deadline_ms = self.deadline.as_millis() as u64,
            "runner starting"
        );
        // Aborting drops the runner future, which kills its process group
        // and releases its temp artifacts. This also covers the caller
        // dropping `execute` before the deadline.
        let mut task = AbortOnDrop(tokio::spawn(async move { runner.run(request).await }));

        match tokio::time::timeout(self.deadline, &mut task.0).await {
            Ok(joined) => joined?,
            Err(_) => Err(ExecutionFault::Timeout(self.deadline)),
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
