use anyhow::{Context, Result};
use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

pub const DEFAULT_REMOTE_EXECUTE_URL: &str = "https://emkc.org/api/v2/piston/execute";

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub bind_addr: SocketAddr,
    pub max_body_bytes: usize,
    pub workspace_dir: PathBuf,
    pub execution: ExecutionConfig,
    pub inline: InlineConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub timeout: Duration,
    pub python_bin: String,
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct InlineConfig {
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub execute_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:5000".to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        let execution = ExecutionConfig {
            timeout: Duration::from_millis(
                parse_var(&lookup, "EXECUTION_TIMEOUT_MS", 10_000u64).clamp(100, 300_000),
            ),
            python_bin: lookup("PYTHON_BIN")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "python3".to_string()),
            max_output_bytes: parse_var(&lookup, "MAX_OUTPUT_BYTES", 64 * 1024usize)
                .clamp(1024, 16 * 1024 * 1024),
        };

        let inline = InlineConfig {
            loop_iteration_limit: parse_var(&lookup, "INLINE_LOOP_LIMIT", 10_000_000u64).max(1),
            recursion_limit: parse_var(&lookup, "INLINE_RECURSION_LIMIT", 512usize).clamp(16, 4096),
        };

        let remote = RemoteConfig {
            execute_url: lookup("REMOTE_EXECUTE_URL")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_REMOTE_EXECUTE_URL.to_string()),
            timeout: Duration::from_millis(
                parse_var(&lookup, "REMOTE_TIMEOUT_MS", 15_000u64).clamp(100, 300_000),
            ),
        };

        let logging = LoggingConfig {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format: match lookup("LOG_FORMAT")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Compact,
            },
        };

        Ok(Self {
            bind_addr,
            max_body_bytes: parse_var(&lookup, "MAX_BODY_BYTES", 50 * 1024 * 1024usize).max(1024),
            workspace_dir: lookup("WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("workspace")),
            execution,
            inline,
            remote,
            logging,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}
