use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io;
use tokio::process::Command;
use tokio::time;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_PROGRAM: &str = "omg";

/// Describes which executable backs the external build tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolEndpoint {
    Program(PathBuf),
    /// Marker used when the service intentionally disables the external tool.
    Unavailable,
}

impl Default for ToolEndpoint {
    fn default() -> Self {
        ToolEndpoint::Program(PathBuf::from(DEFAULT_PROGRAM))
    }
}

impl FromStr for ToolEndpoint {
    type Err = ToolEndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() {
            return Err(ToolEndpointParseError::InvalidToolEndpoint(s.to_owned()));
        }

        if value.eq_ignore_ascii_case("disabled") || value.eq_ignore_ascii_case("unavailable") {
            return Ok(ToolEndpoint::Unavailable);
        }

        Ok(ToolEndpoint::Program(PathBuf::from(value)))
    }
}

/// Errors encountered while parsing a [`ToolEndpoint`] from a string.
#[derive(Debug, Error, Clone)]
pub enum ToolEndpointParseError {
    #[error("invalid tool endpoint: {0:?}")]
    InvalidToolEndpoint(String),
}

/// Async client that shells out to the external microservice build tool.
///
/// Every invocation spawns a fresh child process, captures its stdout/stderr and waits for
/// it to exit (or for the configured timeout to elapse, in which case the child is killed).
/// The client is cheap to clone and can be shared across tasks.
///
/// # Errors
/// [`CommandClient::invoke`] returns [`CommandError`] when the program cannot be spawned,
/// the timeout elapses, or the client was created as unavailable. A non-zero exit status
/// is *not* an error at this level; it is reported through [`CommandOutput::success`].
///
/// # Examples
/// ```ignore
/// use omg_micro_command::{CommandClient, ToolEndpoint};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CommandClient::new(ToolEndpoint::default());
/// let output = client.invoke(["build"]).await?;
/// assert!(output.success);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CommandClient {
    inner: Arc<CommandClientInner>,
}

#[derive(Debug)]
struct CommandClientInner {
    endpoint: CommandTarget,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
enum CommandTarget {
    Program(ToolEndpoint, PathBuf),
    Unavailable(ToolEndpoint, Arc<String>),
}

impl CommandClient {
    /// Creates a client for the endpoint using the default timeout.
    pub fn new(endpoint: ToolEndpoint) -> Self {
        Self::with_timeout(endpoint, DEFAULT_COMMAND_TIMEOUT)
    }

    /// Creates a client that kills the child process once `timeout` elapses.
    pub fn with_timeout(endpoint: ToolEndpoint, timeout: Duration) -> Self {
        let target = match &endpoint {
            ToolEndpoint::Program(program) => {
                CommandTarget::Program(endpoint.clone(), program.clone())
            }
            ToolEndpoint::Unavailable => CommandTarget::Unavailable(
                endpoint.clone(),
                Arc::new("tool endpoint marked unavailable".to_owned()),
            ),
        };

        Self {
            inner: Arc::new(CommandClientInner {
                endpoint: target,
                timeout,
                working_dir: None,
            }),
        }
    }

    /// Creates a [`CommandClient`] that always reports an unavailable tool.
    ///
    /// Useful for deployments (and tests) that serve endpoints but never build images.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CommandClientInner {
                endpoint: CommandTarget::Unavailable(
                    ToolEndpoint::Unavailable,
                    Arc::new(reason.into()),
                ),
                timeout: DEFAULT_COMMAND_TIMEOUT,
                working_dir: None,
            }),
        }
    }

    /// Returns a copy of this client that runs commands from `dir`.
    pub fn in_dir(&self, dir: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(CommandClientInner {
                endpoint: self.inner.endpoint.clone(),
                timeout: self.inner.timeout,
                working_dir: Some(dir.as_ref().to_path_buf()),
            }),
        }
    }

    /// Returns the endpoint backing this client.
    pub fn endpoint(&self) -> &ToolEndpoint {
        match &self.inner.endpoint {
            CommandTarget::Program(endpoint, _) | CommandTarget::Unavailable(endpoint, _) => {
                endpoint
            }
        }
    }

    /// Returns the per-invocation timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Runs the tool with `args` and waits for it to exit (or time out).
    ///
    /// # Errors
    /// Returns [`CommandError`] if the tool is unavailable, cannot be spawned, or the
    /// timeout elapses before it exits.
    pub async fn invoke<I, A>(&self, args: I) -> Result<CommandOutput, CommandError>
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        let program = match &self.inner.endpoint {
            CommandTarget::Program(_, program) => program,
            CommandTarget::Unavailable(_, reason) => {
                return Err(CommandError::Unavailable(reason.as_ref().clone()));
            }
        };

        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let mut command = Command::new(program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.inner.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(program = %program.display(), ?args, "invoking external tool");

        let output = match time::timeout(self.inner.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => return Err(CommandError::Timeout(self.inner.timeout)),
        };

        Ok(CommandOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Captured result of a finished tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Indicates whether the tool exited successfully.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Converts an unsuccessful exit into [`CommandError::CommandFailure`].
    pub fn into_result(self) -> Result<Self, CommandError> {
        if self.success {
            return Ok(self);
        }

        let diagnostic = if self.stderr.trim().is_empty() {
            "tool exited unsuccessfully".to_owned()
        } else {
            self.stderr.trim().to_owned()
        };
        Err(CommandError::CommandFailure {
            diagnostic,
            status: self.status,
        })
    }
}

/// Errors emitted by [`CommandClient`] when the tool cannot be run.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command failed ({status:?}): {diagnostic}")]
    CommandFailure {
        diagnostic: String,
        status: Option<i32>,
    },
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("tool unavailable: {0}")]
    Unavailable(String),
}
