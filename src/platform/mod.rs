//! Platform abstraction layer for external processes.
//!
//! Every interaction with the host goes through one of two narrow
//! capabilities so the engines can be exercised against scripted fakes:
//! - [`CommandRunner`]: run a short-lived tool to completion (`networksetup`, `lsof`, `kill`, `security`)
//! - [`ProcessLauncher`]: start a long-lived supervised child (the SSH client)

pub mod process;
#[cfg(test)]
pub mod testing;

pub use process::{SystemLauncher, SystemRunner};

/// Combined output and exit status of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout followed by stderr, lossily decoded.
    pub output: String,
    /// Exit code; signal terminations map to `128 + signal`.
    pub exit_code: i32,
}

impl CommandOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs an external command to completion.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program could not be executed at all.
    /// A non-zero exit is reported through [`CommandOutput::exit_code`].
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput>;

    /// Like [`CommandRunner::run`], with `input` written to the program's stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if the program could not be executed or fed.
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> std::io::Result<CommandOutput>;
}

/// Everything needed to start a supervised child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Complete environment of the child; the parent's environment is not inherited.
    pub env: Vec<(String, String)>,
}

/// A running child process owned by its supervisor.
pub trait ChildProcess: Send {
    /// OS process id.
    fn id(&self) -> u32;

    /// Returns `Some(exit_code)` once the process has exited, `None` while it runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the process status cannot be queried.
    fn try_exit_code(&mut self) -> std::io::Result<Option<i32>>;

    /// Ask the process to terminate (SIGTERM).
    ///
    /// # Errors
    ///
    /// Returns an error if the signal cannot be delivered.
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Block until the process exits and return its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    fn wait(&mut self) -> std::io::Result<i32>;

    /// Whatever the process printed on stderr so far.
    fn diagnostics(&self) -> String {
        String::new()
    }
}

/// Starts supervised child processes.
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the process described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn ChildProcess>>;
}

/// Converts an `ExitStatus` into a plain exit code.
#[must_use]
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}
