use std::{
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::{
    fs::OpenOptions,
    io::{AsyncReadExt, AsyncWriteExt},
    process::Command,
};
use uuid::Uuid;

use crate::dispatch::{
    Runner,
    fault::ExecutionFault,
    language::InterpreterSpec,
    models::{ExecutionRequest, RawOutcome},
};

const CREATE_ATTEMPTS: usize = 4;

static ARTIFACT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A uniquely named file in the shared workspace, removed when dropped.
///
/// Names combine a random v4 uuid with a process-wide sequence number and the
/// file is opened with exclusive create, so two live invocations can never
/// share a path even when they start in the same clock tick.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    pub async fn create(
        dir: &Path,
        prefix: &str,
        extension: &str,
        contents: &[u8],
    ) -> Result<Self, ExecutionFault> {
        let mut last_err: Option<io::Error> = None;

        for _ in 0..CREATE_ATTEMPTS {
            let path = dir.join(unique_name(prefix, extension));
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    // Guard exists before the write so a failed write still cleans up.
                    let artifact = Self { path };
                    file.write_all(contents)
                        .await
                        .map_err(|err| artifact.write_fault(err))?;
                    file.flush().await.map_err(|err| artifact.write_fault(err))?;
                    tracing::debug!(path = %artifact.path.display(), bytes = contents.len(), "temp artifact created");
                    return Ok(artifact);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    last_err = Some(err);
                }
                Err(err) => {
                    return Err(ExecutionFault::Artifact(format!(
                        "failed to create {}: {err}",
                        path.display()
                    )));
                }
            }
        }

        Err(ExecutionFault::Artifact(format!(
            "could not claim a unique temp file in {}: {}",
            dir.display(),
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_fault(&self, err: io::Error) -> ExecutionFault {
        ExecutionFault::Artifact(format!("failed to write {}: {err}", self.path.display()))
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "temp artifact removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove temp artifact"
            ),
        }
    }
}

fn unique_name(prefix: &str, extension: &str) -> String {
    let seq = ARTIFACT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}{}_{seq}.{extension}", Uuid::new_v4().as_simple())
}

/// Kills the child's whole process group unless disarmed after a clean wait.
/// Fires on timeout and on task abort alike, since both drop the guard.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pid) = self.pid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::{
                errno::Errno,
                sys::signal::{Signal, killpg},
                unistd::Pid,
            };
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => tracing::debug!(pid, "killed interpreter process group"),
                Err(Errno::ESRCH) => {}
                Err(err) => tracing::warn!(pid, error = %err, "failed to kill process group"),
            }
        }
        #[cfg(not(unix))]
        tracing::debug!(pid, "process group kill unsupported; relying on kill_on_drop");
    }
}

/// Runs code through an interpreter binary on the host.
pub struct SubprocessRunner {
    interpreter: InterpreterSpec,
    workspace: PathBuf,
    max_output_bytes: usize,
}

impl SubprocessRunner {
    pub fn new(interpreter: InterpreterSpec, workspace: PathBuf, max_output_bytes: usize) -> Self {
        Self {
            interpreter,
            workspace,
            max_output_bytes,
        }
    }

    fn command(&self, source: &Path, stdin: Stdio) -> Command {
        let mut cmd = Command::new(&self.interpreter.program);
        cmd.args(&self.interpreter.args)
            .arg(source)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    fn launch_fault(&self, err: io::Error) -> ExecutionFault {
        let message = if err.kind() == io::ErrorKind::NotFound {
            format!("interpreter `{}` not found on host", self.interpreter.program)
        } else {
            format!("failed to launch `{}`: {err}", self.interpreter.program)
        };
        ExecutionFault::process(message, "")
    }
}

#[async_trait]
impl Runner for SubprocessRunner {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    async fn run(&self, request: ExecutionRequest) -> Result<RawOutcome, ExecutionFault> {
        let source = TempArtifact::create(
            &self.workspace,
            "temp_",
            self.interpreter.extension,
            request.code.as_bytes(),
        )
        .await?;

        // Empty stdin means no redirection; the child sees EOF on first read.
        let stdin_artifact = if request.stdin.is_empty() {
            None
        } else {
            Some(
                TempArtifact::create(
                    &self.workspace,
                    "temp_input_",
                    "txt",
                    request.stdin.as_bytes(),
                )
                .await?,
            )
        };

        let stdin = match &stdin_artifact {
            Some(artifact) => {
                let file = tokio::fs::File::open(artifact.path())
                    .await
                    .map_err(|err| {
                        ExecutionFault::Artifact(format!(
                            "failed to open {}: {err}",
                            artifact.path().display()
                        ))
                    })?;
                Stdio::from(file.into_std().await)
            }
            None => Stdio::null(),
        };

        let mut child = self
            .command(source.path(), stdin)
            .spawn()
            .map_err(|err| self.launch_fault(err))?;
        let mut group = ProcessGroupGuard::new(child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionFault::Internal("missing stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionFault::Internal("missing stderr pipe".to_string()))?;

        let limit = self.max_output_bytes;
        let (stdout, stderr, status) = tokio::join!(
            read_limited(stdout, limit),
            read_limited(stderr, limit),
            child.wait()
        );
        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        let status = status.map_err(|err| {
            ExecutionFault::process(format!("failed to wait for interpreter: {err}"), stderr.clone())
        })?;
        group.disarm();

        if !status.success() {
            return Err(ExecutionFault::process(describe_exit(status), stderr));
        }

        Ok(RawOutcome::new(stdout, stderr))
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("process exited with status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("process terminated by signal {signal}");
        }
    }
    "process exited abnormally".to_string()
}

/// Drains `reader` to EOF, keeping at most `limit` bytes. A cut that lands
/// inside a multi-byte character backs off to the preceding boundary.
async fn read_limited<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut kept = Vec::with_capacity(limit.min(8192));
    let mut truncated = false;
    let mut chunk = [0u8; 4096];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(error = %err, "stopped reading interpreter output");
                break;
            }
        };
        // Past the limit we keep draining so the child never blocks on a full pipe.
        let room = limit.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }

    if truncated {
        if let Err(err) = std::str::from_utf8(&kept) {
            if err.error_len().is_none() {
                kept.truncate(err.valid_up_to());
            }
        }
    }
    kept
}
