//! `std::process` implementations of the platform capabilities.

use std::io::{Read, Write};
use std::process::{Child, Command, Output, Stdio};
use std::sync::{Arc, Mutex};

use super::{exit_code, ChildProcess, CommandOutput, CommandRunner, LaunchSpec, ProcessLauncher};

/// Upper bound on captured stderr of a supervised child.
const MAX_DIAGNOSTICS_BYTES: usize = 8 * 1024;

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        Ok(collect(&output))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> std::io::Result<CommandOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        Ok(collect(&output))
    }
}

fn collect(output: &Output) -> CommandOutput {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    CommandOutput {
        output: text,
        exit_code: exit_code(output.status),
    }
}

/// Launches supervised children on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn ChildProcess>> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .env_clear()
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain stderr on a side thread so the child never blocks on a full pipe.
        let diagnostics = Arc::new(Mutex::new(String::new()));
        if let Some(mut stderr) = child.stderr.take() {
            let sink = Arc::clone(&diagnostics);
            std::thread::spawn(move || {
                let mut buf = [0u8; 1024];
                while let Ok(n) = stderr.read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                    if let Ok(mut text) = sink.lock() {
                        if text.len() < MAX_DIAGNOSTICS_BYTES {
                            text.push_str(&String::from_utf8_lossy(&buf[..n]));
                        }
                    }
                }
            });
        }

        Ok(Box::new(SystemChild { child, diagnostics }))
    }
}

/// A child started by [`SystemLauncher`].
struct SystemChild {
    child: Child,
    diagnostics: Arc<Mutex<String>>,
}

impl ChildProcess for SystemChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_exit_code(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn terminate(&mut self) -> std::io::Result<()> {
        let pid = libc::pid_t::try_from(self.child.id())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        // SAFETY: kill() only sends a signal to the child we spawned and still own.
        let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }

    fn wait(&mut self) -> std::io::Result<i32> {
        Ok(exit_code(self.child.wait()?))
    }

    fn diagnostics(&self) -> String {
        self.diagnostics
            .lock()
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_system_runner_captures_output_and_code() {
        let out = SystemRunner
            .run("/bin/sh", &["-c", "echo out; echo err 1>&2; exit 3"])
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(out.output.contains("out"));
        assert!(out.output.contains("err"));
        assert!(!out.success());
    }

    #[test]
    fn test_system_runner_feeds_stdin() {
        let out = SystemRunner
            .run_with_input("/bin/cat", &[], "fed through stdin\n")
            .unwrap();
        assert!(out.success());
        assert_eq!(out.output, "fed through stdin\n");
    }

    #[test]
    fn test_system_runner_missing_program() {
        assert!(SystemRunner
            .run("/nonexistent/proxytray-tool", &[])
            .is_err());
    }

    #[test]
    fn test_system_launcher_terminate_and_wait() {
        let spec = LaunchSpec {
            program: "/bin/sleep".to_string(),
            args: vec!["30".to_string()],
            env: Vec::new(),
        };
        let mut child = SystemLauncher.launch(&spec).unwrap();
        assert!(child.try_exit_code().unwrap().is_none());

        child.terminate().unwrap();
        let code = child.wait().unwrap();
        assert_eq!(code, 128 + libc::SIGTERM);
    }

    #[test]
    fn test_system_launcher_does_not_inherit_environment() {
        let spec = LaunchSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "test -z \"$HOME\" && echo $MARKER 1>&2".to_string()],
            env: vec![("MARKER".to_string(), "isolated".to_string())],
        };
        let mut child = SystemLauncher.launch(&spec).unwrap();
        assert_eq!(child.wait().unwrap(), 0);

        // stderr is drained asynchronously
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(child.diagnostics(), "isolated");
    }
}
