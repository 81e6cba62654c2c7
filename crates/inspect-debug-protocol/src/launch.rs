//! Launching inspectable targets.
//!
//! A [`Launcher`] starts a program with its inspector listening and reports
//! the WebSocket endpoint to attach to. [`NodeLauncher`] runs a JavaScript
//! runtime with `--inspect-brk`, so the program waits for a debugger before
//! executing its first statement.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use inspect_debug_core::{Error, LaunchSettings, LogLevel, Result};

const LISTENING_BANNER: &str = "Debugger listening on ";

/// Inspector chatter the runtime writes to stderr.
const INSPECTOR_NOISE: &[&str] = &[
    "For help, see: https://nodejs.org/en/docs/inspector",
    "Debugger attached.",
    "Waiting for the debugger to disconnect...",
];

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSpec {
    /// Program (script) path
    pub program: String,
    /// Program arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Runtime override; the launcher's default when `None`
    pub runtime: Option<String>,
    /// Extra runtime flags
    pub runtime_args: Vec<String>,
}

impl LaunchSpec {
    /// Launch `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Set program arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Override the runtime executable.
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }
}

/// One line of output from a launched process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `Stdout` or `Stderr`
    pub level: LogLevel,
    /// Line without its terminator
    pub line: String,
}

/// A running launched program.
#[derive(Debug)]
pub struct TargetProcess {
    child: Child,
    pid: Option<u32>,
    output: Option<mpsc::UnboundedReceiver<ProcessOutput>>,
}

impl TargetProcess {
    /// OS process id.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the stdout/stderr line stream. Returns `None` after the first call.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<ProcessOutput>> {
        self.output.take()
    }

    /// Exit code if the process has exited.
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(|status| status.code().unwrap_or(-1)))
    }

    /// Kill the process and reap it. Killing an exited process is a no-op.
    pub async fn kill(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        info!("Killing target process {:?}", self.pid);
        match self.child.kill().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => {
                error!("Failed to kill target process {:?}: {}", self.pid, e);
                Err(Error::Io(e))
            }
        }
    }
}

/// A launched target ready to attach to.
#[derive(Debug)]
pub struct LaunchedTarget {
    /// Inspector WebSocket endpoint
    pub endpoint: String,
    /// The process, when the launcher owns one
    pub process: Option<TargetProcess>,
}

/// Starts inspectable targets.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start `spec` and return its inspector endpoint.
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedTarget>;
}

/// Launches programs under a Node-compatible runtime.
#[derive(Debug, Clone, Default)]
pub struct NodeLauncher {
    settings: LaunchSettings,
}

impl NodeLauncher {
    /// Create a launcher from settings.
    pub fn new(settings: LaunchSettings) -> Self {
        Self { settings }
    }

    fn command_line(&self, spec: &LaunchSpec) -> (String, Vec<String>) {
        let runtime = spec
            .runtime
            .clone()
            .unwrap_or_else(|| self.settings.runtime.clone());

        let mut args = self.settings.runtime_args.clone();
        args.extend(spec.runtime_args.iter().cloned());
        args.push("--inspect-brk=127.0.0.1:0".to_string());
        args.push(spec.program.clone());
        args.extend(spec.args.iter().cloned());
        (runtime, args)
    }
}

#[async_trait]
impl Launcher for NodeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedTarget> {
        let (runtime, args) = self.command_line(spec);
        info!(
            "Launching target: runtime='{}' args={:?} cwd={:?}",
            runtime, args, spec.cwd
        );

        let mut command = Command::new(&runtime);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            debug!("Setting working directory to: {}", dir);
            command.current_dir(dir);
        }
        command.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut child = command.spawn().map_err(|e| {
            error!("Failed to spawn '{}': {}", runtime, e);
            Error::Launch(format!("Failed to spawn '{runtime}': {e}"))
        })?;
        let pid = child.id();

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, LogLevel::Stdout, output_tx.clone(), None));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                stderr,
                LogLevel::Stderr,
                output_tx,
                Some(endpoint_tx),
            ));
        }

        let timeout = Duration::from_millis(self.settings.startup_timeout_ms);
        let endpoint = match tokio::time::timeout(timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                let _ = child.kill().await;
                return Err(Error::Launch(format!(
                    "'{}' exited before announcing an inspector endpoint",
                    spec.program
                )));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::Launch(format!(
                    "Timed out after {}ms waiting for the inspector endpoint of '{}'",
                    timeout.as_millis(),
                    spec.program
                )));
            }
        };

        info!("Target {:?} listening at {}", pid, endpoint);
        Ok(LaunchedTarget {
            endpoint,
            process: Some(TargetProcess {
                child,
                pid,
                output: Some(output_rx),
            }),
        })
    }
}

/// Extract the endpoint from the runtime's listening banner.
pub fn parse_listening_banner(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(LISTENING_BANNER)?;
    let endpoint = rest.split_whitespace().next()?;
    endpoint.starts_with("ws://").then(|| endpoint.to_string())
}

async fn forward_lines<R>(
    reader: R,
    level: LogLevel,
    tx: mpsc::UnboundedSender<ProcessOutput>,
    mut endpoint_tx: Option<oneshot::Sender<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading target {}: {}", level, e);
                break;
            }
        };

        if endpoint_tx.is_some() {
            if let Some(endpoint) = parse_listening_banner(&line) {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(endpoint);
                }
                continue;
            }
        }
        if level == LogLevel::Stderr && INSPECTOR_NOISE.contains(&line.trim()) {
            continue;
        }

        // Keep draining the pipe even when nobody listens.
        let _ = tx.send(ProcessOutput { level, line });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listening_banner() {
        assert_eq!(
            parse_listening_banner(
                "Debugger listening on ws://127.0.0.1:9229/0f2c936f-b1cd-4ac9-aab3-f63b0f33d55e"
            ),
            Some("ws://127.0.0.1:9229/0f2c936f-b1cd-4ac9-aab3-f63b0f33d55e".to_string())
        );
        assert_eq!(parse_listening_banner("Debugger listening on nothing"), None);
        assert_eq!(parse_listening_banner("hello"), None);
    }

    #[test]
    fn test_command_line_order() {
        let launcher = NodeLauncher::new(LaunchSettings {
            runtime: "node".to_string(),
            runtime_args: vec!["--enable-source-maps".to_string()],
            startup_timeout_ms: 1000,
        });
        let spec = LaunchSpec::new("app.js").with_args(["--port", "8080"]);
        let (runtime, args) = launcher.command_line(&spec);
        assert_eq!(runtime, "node");
        assert_eq!(
            args,
            vec![
                "--enable-source-maps",
                "--inspect-brk=127.0.0.1:0",
                "app.js",
                "--port",
                "8080"
            ]
        );

        let spec = spec.with_runtime("/opt/node/bin/node");
        assert_eq!(launcher.command_line(&spec).0, "/opt/node/bin/node");
    }

    #[tokio::test]
    async fn test_missing_runtime_is_launch_error() {
        let launcher = NodeLauncher::new(LaunchSettings {
            runtime: "/nonexistent/runtime".to_string(),
            ..Default::default()
        });
        let err = launcher.launch(&LaunchSpec::new("app.js")).await.unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_reads_endpoint_and_forwards_output() {
        // `sh -c script` treats the remaining arguments as $0, $1, ...
        let script = "echo 'Debugger listening on ws://127.0.0.1:9/abc' >&2; \
                      echo 'For help, see: https://nodejs.org/en/docs/inspector' >&2; \
                      echo out-line; echo err-line >&2; sleep 5";
        let launcher = NodeLauncher::new(LaunchSettings {
            runtime: "sh".to_string(),
            runtime_args: vec!["-c".to_string(), script.to_string()],
            startup_timeout_ms: 2000,
        });

        let mut target = launcher.launch(&LaunchSpec::new("prog")).await.unwrap();
        assert_eq!(target.endpoint, "ws://127.0.0.1:9/abc");

        let mut process = target.process.take().unwrap();
        let mut output = process.take_output().unwrap();
        let mut lines = Vec::new();
        while lines.len() < 2 {
            let line = tokio::time::timeout(Duration::from_secs(2), output.recv())
                .await
                .unwrap()
                .unwrap();
            lines.push(line);
        }
        assert!(lines.contains(&ProcessOutput {
            level: LogLevel::Stdout,
            line: "out-line".to_string()
        }));
        assert!(lines.contains(&ProcessOutput {
            level: LogLevel::Stderr,
            line: "err-line".to_string()
        }));

        process.kill().await.unwrap();
        assert!(process.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_without_banner_is_launch_error() {
        let launcher = NodeLauncher::new(LaunchSettings {
            runtime: "sh".to_string(),
            runtime_args: vec!["-c".to_string(), "echo nope >&2".to_string()],
            startup_timeout_ms: 2000,
        });
        let err = launcher.launch(&LaunchSpec::new("prog")).await.unwrap_err();
        assert!(matches!(err, Error::Launch(_)));
    }
}
