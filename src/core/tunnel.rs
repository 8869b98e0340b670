//! SSH dynamic-forward process manager.
//!
//! The tunnel is an `ssh -N -D` child supervised by a watcher thread. The
//! password reaches ssh through a short-lived owner-only askpass helper, so it
//! never appears in the argument list or the inherited environment.
//!
//! ssh has no "forward ready" signal: a child still alive after the grace
//! period is reported as established. A forward that fails silently later
//! (remote side dropping it, port taken after startup) is not detected here;
//! it only shows up as the process exiting, which the watcher logs and
//! [`TunnelManager::is_running`] reflects.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::error::{Error, Result};
use super::settings::TunnelSettings;
use crate::config::AppConfig;
use crate::constants;
use crate::logger::{self, LogLevel};
use crate::platform::{ChildProcess, CommandRunner, LaunchSpec, ProcessLauncher};
use crate::state::TunnelPhase;

/// Fixed parameters of every tunnel launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelOptions {
    pub ssh_binary: String,
    pub lsof_binary: String,
    pub kill_binary: String,
    pub keepalive_interval: u32,
    pub keepalive_count_max: u32,
    pub strict_host_key_checking: bool,
    /// Directory for the askpass helper.
    pub run_dir: PathBuf,
    grace_period: Duration,
}

impl TunnelOptions {
    pub fn new(config: &AppConfig, run_dir: PathBuf) -> Self {
        Self {
            ssh_binary: config.ssh_binary.clone(),
            lsof_binary: constants::LSOF_BINARY.to_string(),
            kill_binary: constants::KILL_BINARY.to_string(),
            keepalive_interval: config.keepalive_interval,
            keepalive_count_max: config.keepalive_count_max,
            strict_host_key_checking: config.strict_host_key_checking,
            run_dir,
            grace_period: Duration::from_millis(constants::TUNNEL_GRACE_PERIOD_MS),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    fn helper_path(&self) -> PathBuf {
        self.run_dir.join(format!(
            "{}-{}",
            constants::ASKPASS_PREFIX,
            std::process::id()
        ))
    }
}

type SharedChild = Arc<Mutex<Box<dyn ChildProcess>>>;

/// The live tunnel. Never leaves the manager.
struct TunnelHandle {
    child: SharedChild,
    pid: u32,
    helper: PathBuf,
    cancelled: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
}

/// Spawns, supervises and tears down the SSH tunnel.
pub struct TunnelManager {
    launcher: Arc<dyn ProcessLauncher>,
    runner: Arc<dyn CommandRunner>,
    options: TunnelOptions,
    handle: Mutex<Option<TunnelHandle>>,
    phase: Arc<Mutex<TunnelPhase>>,
}

impl TunnelManager {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        runner: Arc<dyn CommandRunner>,
        options: TunnelOptions,
    ) -> Self {
        Self {
            launcher,
            runner,
            options,
            handle: Mutex::new(None),
            phase: Arc::new(Mutex::new(TunnelPhase::Idle)),
        }
    }

    #[must_use]
    pub fn phase(&self) -> TunnelPhase {
        *lock(&self.phase)
    }

    /// Pid of the supervised client while it is alive.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        let guard = lock(&self.handle);
        let handle = guard.as_ref()?;
        let alive = matches!(lock(&handle.child).try_exit_code(), Ok(None));
        alive.then_some(handle.pid)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    /// Starts the tunnel in the background, stopping any previous one first.
    ///
    /// `on_result` is invoked exactly once from the watcher thread: `Ok` once
    /// the client has survived the grace period, `Err` if it exits (or is
    /// stopped) before that, or immediately on this thread if the helper
    /// cannot be written or the client cannot be spawned.
    pub fn start<F>(&self, settings: &TunnelSettings, secret: &str, on_result: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.stop();
        set_phase(&self.phase, TunnelPhase::Starting);

        let helper = self.options.helper_path();
        if let Err(e) = self.write_helper(&helper, secret) {
            remove_helper(&helper);
            set_phase(&self.phase, TunnelPhase::Failed);
            on_result(Err(failed(format!("could not write askpass helper: {e}"))));
            return;
        }

        let spec = self.launch_spec(settings, &helper);
        let child = match self.launcher.launch(&spec) {
            Ok(child) => child,
            Err(e) => {
                remove_helper(&helper);
                set_phase(&self.phase, TunnelPhase::Failed);
                on_result(Err(failed(format!(
                    "could not launch {}: {e}",
                    self.options.ssh_binary
                ))));
                return;
            }
        };

        let pid = child.id();
        logger::log(
            LogLevel::Info,
            "TUNNEL",
            format!(
                "Started ssh (pid {pid}) for {settings}, SOCKS on {}:{}",
                constants::SOCKS_HOST,
                constants::SOCKS_PORT
            ),
        );

        let child: SharedChild = Arc::new(Mutex::new(child));
        let cancelled = Arc::new(AtomicBool::new(false));
        let watcher = Watcher {
            child: Arc::clone(&child),
            cancelled: Arc::clone(&cancelled),
            phase: Arc::clone(&self.phase),
            helper: helper.clone(),
            grace_period: self.options.grace_period,
        };
        let watcher = std::thread::spawn(move || watcher.run(on_result));

        *lock(&self.handle) = Some(TunnelHandle {
            child,
            pid,
            helper,
            cancelled,
            watcher: Some(watcher),
        });
    }

    /// Tears the tunnel down. Safe to call at any time, including when idle.
    ///
    /// Terminates and reaps the client, deletes the askpass helper, then
    /// force-kills whatever still listens on the local SOCKS port.
    pub fn stop(&self) {
        let handle = lock(&self.handle).take();
        if let Some(mut handle) = handle {
            set_phase(&self.phase, TunnelPhase::Stopping);
            handle.cancelled.store(true, Ordering::SeqCst);
            terminate(&handle.child, handle.pid);
            if let Some(watcher) = handle.watcher.take() {
                let _ = watcher.join();
            }
            remove_helper(&handle.helper);
        }

        self.sweep_helpers();
        self.reclaim_port();
        set_phase(&self.phase, TunnelPhase::Idle);
    }

    fn write_helper(&self, path: &Path, secret: &str) -> std::io::Result<()> {
        crate::utils::create_private_dir(&self.options.run_dir)?;
        crate::utils::write_file_with_mode(path, askpass_script(secret).as_bytes(), 0o700)
    }

    fn launch_spec(&self, settings: &TunnelSettings, helper: &Path) -> LaunchSpec {
        let opts = &self.options;
        let mut args = vec![
            "-N".to_string(),
            "-D".to_string(),
            format!("{}:{}", constants::SOCKS_HOST, constants::SOCKS_PORT),
            "-p".to_string(),
            settings.port.to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-o".to_string(),
            format!("ServerAliveInterval={}", opts.keepalive_interval),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", opts.keepalive_count_max),
        ];

        if opts.strict_host_key_checking {
            args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()]);
        } else {
            logger::log(LogLevel::Warning, "TUNNEL", constants::MSG_HOST_KEY_WARNING);
            args.extend([
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]);
        }
        args.push(format!("{}@{}", settings.username, settings.host));

        LaunchSpec {
            program: opts.ssh_binary.clone(),
            args,
            env: vec![
                (
                    "SSH_ASKPASS".to_string(),
                    helper.to_string_lossy().to_string(),
                ),
                ("SSH_ASKPASS_REQUIRE".to_string(), "force".to_string()),
                ("DISPLAY".to_string(), "proxytray:0".to_string()),
            ],
        }
    }

    /// Removes helpers left behind by a previous run that crashed.
    fn sweep_helpers(&self) {
        let Ok(entries) = std::fs::read_dir(&self.options.run_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(constants::ASKPASS_PREFIX) {
                remove_helper(&entry.path());
            }
        }
    }

    /// Pids listening on the local SOCKS port, whoever started them.
    #[must_use]
    pub fn port_listeners(&self) -> Vec<u32> {
        let port_filter = format!("-iTCP:{}", constants::SOCKS_PORT);
        let out = match self.runner.run(
            &self.options.lsof_binary,
            &["-nP", &port_filter, "-sTCP:LISTEN", "-t"],
        ) {
            Ok(out) => out,
            Err(e) => {
                logger::log(
                    LogLevel::Warning,
                    "TUNNEL",
                    format!("Could not query port {}: {e}", constants::SOCKS_PORT),
                );
                return Vec::new();
            }
        };
        // lsof exits 1 when nothing matches
        if !out.success() {
            return Vec::new();
        }
        out.output
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect()
    }

    /// Kills any process still listening on the local SOCKS port.
    fn reclaim_port(&self) {
        let own_pid = std::process::id();
        for pid in self.port_listeners().into_iter().filter(|pid| *pid != own_pid) {
            let pid_arg = pid.to_string();
            match self
                .runner
                .run(&self.options.kill_binary, &["-9", &pid_arg])
            {
                Ok(res) if res.success() => logger::log(
                    LogLevel::Warning,
                    "TUNNEL",
                    format!(
                        "Killed leftover listener on port {} (pid {pid})",
                        constants::SOCKS_PORT
                    ),
                ),
                Ok(res) => logger::log(
                    LogLevel::Warning,
                    "TUNNEL",
                    format!("kill -9 {pid} exited {}: {}", res.exit_code, res.output.trim()),
                ),
                Err(e) => logger::log(
                    LogLevel::Warning,
                    "TUNNEL",
                    format!("kill -9 {pid} failed: {e}"),
                ),
            }
        }
    }
}

impl Drop for TunnelManager {
    fn drop(&mut self) {
        if lock(&self.handle).is_some() {
            self.stop();
        }
    }
}

/// Background supervision of one tunnel child.
struct Watcher {
    child: SharedChild,
    cancelled: Arc<AtomicBool>,
    phase: Arc<Mutex<TunnelPhase>>,
    helper: PathBuf,
    grace_period: Duration,
}

impl Watcher {
    fn run<F>(self, on_result: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let deadline = Instant::now() + self.grace_period;
        // Taken exactly once; whoever takes it reports the outcome.
        let mut pending = Some(on_result);

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                if let Some(report) = pending.take() {
                    report(Err(failed(
                        "tunnel stopped before it was established".to_string(),
                    )));
                }
                return;
            }

            let status = lock(&self.child).try_exit_code();
            match status {
                Ok(Some(code)) => {
                    self.exited(code, pending.take());
                    return;
                }
                Ok(None) => {}
                Err(e) => logger::log(
                    LogLevel::Debug,
                    "TUNNEL",
                    format!("Could not poll ssh: {e}"),
                ),
            }

            if pending.is_some() && Instant::now() >= deadline {
                set_phase(&self.phase, TunnelPhase::Running);
                logger::log(LogLevel::Info, "TUNNEL", "SSH tunnel established");
                if let Some(report) = pending.take() {
                    report(Ok(()));
                }
            }

            let poll = if pending.is_some() {
                constants::TUNNEL_POLL_MS
            } else {
                constants::TUNNEL_SUPERVISE_POLL_MS
            };
            std::thread::sleep(Duration::from_millis(poll));
        }
    }

    fn exited<F>(&self, code: i32, pending: Option<F>)
    where
        F: FnOnce(Result<()>),
    {
        if self.cancelled.load(Ordering::SeqCst) {
            if let Some(report) = pending {
                report(Err(failed(
                    "tunnel stopped before it was established".to_string(),
                )));
            }
            return;
        }

        let diagnostics = lock(&self.child).diagnostics();
        let mut reason = format!("ssh exited with code {code}");
        if !diagnostics.is_empty() {
            reason.push_str(": ");
            reason.push_str(&crate::utils::truncate(last_line(&diagnostics), 200));
        }
        remove_helper(&self.helper);

        if let Some(report) = pending {
            set_phase(&self.phase, TunnelPhase::Failed);
            logger::log(
                LogLevel::Error,
                "TUNNEL",
                format!("SSH tunnel failed to start: {reason}"),
            );
            report(Err(failed(reason)));
        } else {
            set_phase(&self.phase, TunnelPhase::Idle);
            logger::log(
                LogLevel::Warning,
                "TUNNEL",
                format!("SSH tunnel exited unexpectedly: {reason}"),
            );
        }
    }
}

/// Shell script printing `secret` on stdout for `SSH_ASKPASS`.
fn askpass_script(secret: &str) -> String {
    let quoted = secret.replace('\'', r#"'"'"'"#);
    format!("#!/bin/sh\nprintf '%s\\n' '{quoted}'\n")
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
}

fn terminate(child: &SharedChild, pid: u32) {
    let mut child = lock(child);
    if !matches!(child.try_exit_code(), Ok(None)) {
        return;
    }
    if let Err(e) = child.terminate() {
        logger::log(
            LogLevel::Warning,
            "TUNNEL",
            format!("Could not signal ssh (pid {pid}): {e}"),
        );
    }
    match child.wait() {
        Ok(code) => logger::log(
            LogLevel::Info,
            "TUNNEL",
            format!("SSH tunnel stopped (pid {pid}, exit {code})"),
        ),
        Err(e) => logger::log(
            LogLevel::Warning,
            "TUNNEL",
            format!("Could not reap ssh (pid {pid}): {e}"),
        ),
    }
}

fn remove_helper(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => logger::log(LogLevel::Debug, "TUNNEL", "Removed askpass helper"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => logger::log(
            LogLevel::Warning,
            "TUNNEL",
            format!("Could not remove {}: {e}", path.display()),
        ),
    }
}

fn failed(reason: String) -> Error {
    Error::TunnelStartFailed { reason }
}

fn set_phase(phase: &Mutex<TunnelPhase>, value: TunnelPhase) {
    *lock(phase) = value;
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::{ChildBehavior, FakeHost, FakeLauncher};
    use std::sync::mpsc;

    struct Fixture {
        dir: PathBuf,
        launcher: Arc<FakeLauncher>,
        host: Arc<FakeHost>,
        manager: TunnelManager,
    }

    impl Fixture {
        fn new(name: &str, behavior: ChildBehavior) -> Self {
            Self::with_config(name, behavior, &AppConfig::default())
        }

        fn with_config(name: &str, behavior: ChildBehavior, config: &AppConfig) -> Self {
            let dir = std::env::temp_dir().join(format!("proxytray_test_tunnel_{name}"));
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir).unwrap();

            let launcher = Arc::new(FakeLauncher::new(behavior));
            let host = Arc::new(FakeHost::with_services(&["Wi-Fi"]));
            let options = TunnelOptions::new(config, dir.join("run"))
                .with_grace_period(Duration::from_millis(100));
            let manager = TunnelManager::new(
                Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
                Arc::clone(&host) as Arc<dyn CommandRunner>,
                options,
            );
            Self {
                dir,
                launcher,
                host,
                manager,
            }
        }

        fn start(&self, secret: &str) -> mpsc::Receiver<Result<()>> {
            let settings = TunnelSettings::new("tunnel.example", "bob", 2222).unwrap();
            let (tx, rx) = mpsc::channel();
            self.manager.start(&settings, secret, move |result| {
                let _ = tx.send(result);
            });
            rx
        }

        fn helper(&self) -> PathBuf {
            self.manager.options.helper_path()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.manager.stop();
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn wait(rx: &mpsc::Receiver<Result<()>>) -> Result<()> {
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_start_reports_success_after_grace_period() {
        let fx = Fixture::new("success", ChildBehavior::StayAlive);
        let rx = fx.start("hunter2");
        assert_eq!(fx.manager.phase(), TunnelPhase::Starting);

        wait(&rx).unwrap();
        assert_eq!(fx.manager.phase(), TunnelPhase::Running);
        assert!(fx.manager.is_running());
        assert!(fx.helper().exists());

        // Exactly one report
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_launch_spec_keeps_secret_out_of_args_and_env() {
        let fx = Fixture::new("launch_spec", ChildBehavior::StayAlive);
        wait(&fx.start("s3cret")).unwrap();

        let launches = fx.launcher.launches();
        assert_eq!(launches.len(), 1);
        let spec = &launches[0];
        assert_eq!(spec.program, "/usr/bin/ssh");
        assert_eq!(
            spec.args,
            vec![
                "-N",
                "-D",
                "127.0.0.1:1080",
                "-p",
                "2222",
                "-o",
                "ExitOnForwardFailure=yes",
                "-o",
                "ServerAliveInterval=30",
                "-o",
                "ServerAliveCountMax=3",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "UserKnownHostsFile=/dev/null",
                "bob@tunnel.example",
            ]
        );

        let env: Vec<&str> = spec.env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(env, vec!["SSH_ASKPASS", "SSH_ASKPASS_REQUIRE", "DISPLAY"]);
        assert!(!spec.args.iter().any(|a| a.contains("s3cret")));
        assert!(!spec.env.iter().any(|(_, v)| v.contains("s3cret")));
        assert_eq!(spec.env[0].1, fx.helper().to_string_lossy());
    }

    #[cfg(unix)]
    #[test]
    fn test_helper_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new("helper_mode", ChildBehavior::StayAlive);
        wait(&fx.start("pw")).unwrap();

        let meta = std::fs::metadata(fx.helper()).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o700);
        let run_dir = std::fs::metadata(fx.dir.join("run")).unwrap();
        assert_eq!(run_dir.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn test_strict_host_key_checking() {
        let config = AppConfig {
            strict_host_key_checking: true,
            ..AppConfig::default()
        };
        let fx = Fixture::with_config("strict", ChildBehavior::StayAlive, &config);
        wait(&fx.start("pw")).unwrap();

        let args = &fx.launcher.launches()[0].args;
        assert!(args.contains(&"StrictHostKeyChecking=yes".to_string()));
        assert!(!args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
    }

    #[test]
    fn test_early_exit_reports_failure() {
        let fx = Fixture::new(
            "early_exit",
            ChildBehavior::ExitAfter(Duration::from_millis(10), 255),
        );
        let err = wait(&fx.start("pw")).unwrap_err();
        match err {
            Error::TunnelStartFailed { reason } => assert!(reason.contains("255"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.manager.phase(), TunnelPhase::Failed);
        assert!(!fx.manager.is_running());
        assert!(!fx.helper().exists());
    }

    #[test]
    fn test_clean_exit_within_grace_period_is_failure() {
        let fx = Fixture::new(
            "clean_early_exit",
            ChildBehavior::ExitAfter(Duration::from_millis(5), 0),
        );
        let rx = fx.start("pw");
        match wait(&rx).unwrap_err() {
            Error::TunnelStartFailed { reason } => {
                assert!(reason.contains("code 0"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.manager.phase(), TunnelPhase::Failed);

        // Reported once: the watcher is done and the sender is gone
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(300)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
        assert!(!fx.manager.is_running());
        assert!(!fx.helper().exists());
    }

    #[test]
    fn test_spawn_failure_reports_failure() {
        let fx = Fixture::new("spawn_failure", ChildBehavior::FailToSpawn);
        let err = wait(&fx.start("pw")).unwrap_err();
        assert!(matches!(err, Error::TunnelStartFailed { .. }));
        assert!(!fx.helper().exists());
        assert_eq!(fx.manager.phase(), TunnelPhase::Failed);

        fx.manager.stop();
        assert_eq!(fx.manager.phase(), TunnelPhase::Idle);
    }

    #[test]
    fn test_stop_terminates_and_cleans_up() {
        let fx = Fixture::new("stop", ChildBehavior::StayAlive);
        wait(&fx.start("pw")).unwrap();
        assert_eq!(fx.launcher.running(), 1);

        fx.host.add_listener(31337);
        assert_eq!(fx.manager.port_listeners(), vec![31337]);
        fx.manager.stop();

        assert_eq!(fx.launcher.running(), 0);
        assert!(!fx.helper().exists());
        assert_eq!(fx.host.killed(), vec![31337]);
        assert!(fx.host.listeners().is_empty());
        assert_eq!(fx.manager.phase(), TunnelPhase::Idle);
        assert!(!fx.manager.is_running());
    }

    #[test]
    fn test_stop_when_idle_is_safe() {
        let fx = Fixture::new("stop_idle", ChildBehavior::StayAlive);
        fx.manager.stop();
        fx.manager.stop();
        assert_eq!(fx.manager.phase(), TunnelPhase::Idle);
        assert!(fx.host.killed().is_empty());

        // Orphaned listener from a crashed run is still reclaimed
        fx.host.add_listener(777);
        fx.manager.stop();
        assert_eq!(fx.host.killed(), vec![777]);
    }

    #[test]
    fn test_stop_sweeps_stale_helpers() {
        let fx = Fixture::new("sweep", ChildBehavior::StayAlive);
        let run = fx.dir.join("run");
        std::fs::create_dir_all(&run).unwrap();
        let stale = run.join("askpass-99999");
        std::fs::write(&stale, "#!/bin/sh\n").unwrap();

        fx.manager.stop();
        assert!(!stale.exists());
    }

    #[test]
    fn test_stop_during_grace_period_reports_failure() {
        let config = AppConfig::default();
        let mut fx = Fixture::with_config("cancel", ChildBehavior::StayAlive, &config);
        fx.manager.options = fx
            .manager
            .options
            .clone()
            .with_grace_period(Duration::from_secs(30));

        let rx = fx.start("pw");
        fx.manager.stop();

        let err = wait(&rx).unwrap_err();
        assert!(err.to_string().contains("stopped before"));
        assert_eq!(fx.launcher.running(), 0);
    }

    #[test]
    fn test_restart_stops_previous_tunnel() {
        let fx = Fixture::new("restart", ChildBehavior::StayAlive);
        wait(&fx.start("pw")).unwrap();
        wait(&fx.start("pw")).unwrap();

        assert_eq!(fx.launcher.launches().len(), 2);
        assert_eq!(fx.launcher.running(), 1);
    }

    #[test]
    fn test_unsolicited_exit_after_success() {
        let fx = Fixture::new("crash", ChildBehavior::StayAlive);
        let rx = fx.start("pw");
        wait(&rx).unwrap();

        fx.launcher.crash_all();
        std::thread::sleep(Duration::from_millis(
            constants::TUNNEL_SUPERVISE_POLL_MS + 300,
        ));

        assert!(!fx.manager.is_running());
        assert_eq!(fx.manager.phase(), TunnelPhase::Idle);
        assert!(!fx.helper().exists());
        // Not reported a second time
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_askpass_script_quotes_secret() {
        assert_eq!(
            askpass_script("it's"),
            "#!/bin/sh\nprintf '%s\\n' 'it'\"'\"'s'\n"
        );
        assert_eq!(askpass_script("plain"), "#!/bin/sh\nprintf '%s\\n' 'plain'\n");
    }

    #[test]
    fn test_last_line() {
        assert_eq!(
            last_line("Warning: foo\nPermission denied (password).\n\n"),
            "Permission denied (password)."
        );
        assert_eq!(last_line(""), "");
    }
}
