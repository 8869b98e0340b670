//! Scripted fakes for the platform capabilities.
//!
//! [`FakeHost`] simulates `networksetup`, `lsof` and `kill` with per-service
//! proxy state; [`FakeLauncher`] hands out children whose lifetime is scripted.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{ChildProcess, CommandOutput, CommandRunner, LaunchSpec, ProcessLauncher};

/// Proxy settings of one simulated network service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeService {
    pub auto_url: Option<String>,
    pub auto_enabled: bool,
    pub socks_server: Option<String>,
    pub socks_port: Option<String>,
    pub socks_enabled: bool,
}

#[derive(Debug, Default)]
struct HostState {
    listing_order: Vec<String>,
    services: BTreeMap<String, FakeService>,
    disabled: Vec<String>,
    unqueryable: Vec<String>,
    fail_on: Option<String>,
    listeners: Vec<u32>,
    killed: Vec<u32>,
    calls: Vec<Vec<String>>,
    /// Generic passwords keyed by (service, account).
    keychain: BTreeMap<(String, String), String>,
}

/// Simulated host command surface.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    /// A host with the given enabled, queryable services.
    pub fn with_services(names: &[&str]) -> Self {
        let host = Self::default();
        {
            let mut state = host.state.lock().unwrap();
            for name in names {
                state.listing_order.push((*name).to_string());
                state
                    .services
                    .insert((*name).to_string(), FakeService::default());
            }
        }
        host
    }

    /// Adds a service listed as disabled (`*` marker).
    pub fn add_disabled_service(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.disabled.push(name.to_string());
        state.listing_order.push(format!("*{name}"));
    }

    /// Adds a listed service whose `-getinfo` query fails.
    pub fn add_unqueryable_service(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.unqueryable.push(name.to_string());
        state.listing_order.push(name.to_string());
    }

    /// Makes every `networksetup` invocation with this flag exit non-zero.
    pub fn fail_on(&self, flag: Option<&str>) {
        self.state.lock().unwrap().fail_on = flag.map(str::to_string);
    }

    /// Registers a process listening on the local SOCKS port.
    pub fn add_listener(&self, pid: u32) {
        self.state.lock().unwrap().listeners.push(pid);
    }

    pub fn service(&self, name: &str) -> FakeService {
        self.state
            .lock()
            .unwrap()
            .services
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Directly overwrite a service's settings (e.g. leftovers of a crashed run).
    pub fn set_service(&self, name: &str, service: FakeService) {
        self.state
            .lock()
            .unwrap()
            .services
            .insert(name.to_string(), service);
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn listeners(&self) -> Vec<u32> {
        self.state.lock().unwrap().listeners.clone()
    }

    /// All recorded invocations as `[tool, args...]`.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded mutating `networksetup` calls (flag plus service).
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c[0] == "networksetup" && c.len() > 2 && c[1].starts_with("-set"))
            .map(|c| c[1..].join(" "))
            .collect()
    }

    pub fn keychain_item(&self, service: &str, account: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .keychain
            .get(&(service.to_string(), account.to_string()))
            .cloned()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn networksetup(state: &mut HostState, args: &[&str]) -> CommandOutput {
        let flag = args.first().copied().unwrap_or_default();
        if state.fail_on.as_deref() == Some(flag) {
            return failed(&format!("** Error: {flag} failed"));
        }

        if flag == "-listallnetworkservices" {
            let mut out =
                String::from("An asterisk (*) denotes that a network service is disabled.\n");
            for name in &state.listing_order {
                out.push_str(name);
                out.push('\n');
            }
            return ok(&out);
        }

        let Some(name) = args.get(1).copied() else {
            return failed("missing service");
        };
        if state.unqueryable.iter().any(|s| s == name) {
            return failed(&format!("** Error: The parameters were not valid: {name}"));
        }
        let Some(service) = state.services.get_mut(name) else {
            return failed(&format!("{name} is not a recognized network service."));
        };

        match (flag, &args[2..]) {
            ("-getinfo", []) => ok("DHCP Configuration\nIP address: 192.168.1.20\n"),
            ("-setsocksfirewallproxystate", [value]) => {
                service.socks_enabled = *value == "on";
                ok("")
            }
            ("-setautoproxystate", [value]) => {
                service.auto_enabled = *value == "on";
                ok("")
            }
            ("-setautoproxyurl", [url]) => {
                service.auto_url = Some((*url).to_string());
                ok("")
            }
            ("-setsocksfirewallproxy", [host, port]) => {
                service.socks_server = Some((*host).to_string());
                service.socks_port = Some((*port).to_string());
                ok("")
            }
            ("-getautoproxyurl", []) => ok(&format!(
                "URL: {}\nEnabled: {}\n",
                service.auto_url.as_deref().unwrap_or("(null)"),
                yes_no(service.auto_enabled)
            )),
            ("-getsocksfirewallproxy", []) => ok(&format!(
                "Enabled: {}\nServer: {}\nPort: {}\nAuthenticated Proxy Enabled: 0\n",
                yes_no(service.socks_enabled),
                service.socks_server.as_deref().unwrap_or(""),
                service.socks_port.as_deref().unwrap_or("0"),
            )),
            _ => failed(&format!("unsupported invocation: {}", args.join(" "))),
        }
    }

    /// `security` subcommands, given as argv or as one `-i` input line.
    fn security(state: &mut HostState, args: &[&str]) -> CommandOutput {
        let command = args.first().copied().unwrap_or_default();
        if state.fail_on.as_deref() == Some(command) {
            return failed(&format!("security: {command} failed"));
        }
        let (Some(service), Some(account)) = (flag_value(args, "-s"), flag_value(args, "-a"))
        else {
            return failed("security: missing -s or -a");
        };
        let key = (service.to_string(), account.to_string());

        match command {
            "find-generic-password" => match state.keychain.get(&key) {
                Some(value) => ok(&format!("{value}\n")),
                None => CommandOutput {
                    output: "security: SecKeychainSearchCopyNext: The specified item could not be found in the keychain.\n".to_string(),
                    exit_code: 44,
                },
            },
            "add-generic-password" => {
                let Some(value) = flag_value(args, "-w") else {
                    return failed("security: -w requires a value here");
                };
                if state.keychain.contains_key(&key) && !args.contains(&"-U") {
                    return failed("security: The specified item already exists in the keychain.");
                }
                state.keychain.insert(key, value.to_string());
                ok("")
            }
            _ => failed(&format!("unsupported invocation: {}", args.join(" "))),
        }
    }
}

fn flag_value<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| *a == flag)
        .and_then(|i| args.get(i + 1))
        .copied()
}

impl CommandRunner for FakeHost {
    fn run(&self, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
        let tool = Path::new(program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(program)
            .to_string();

        let mut state = self.state.lock().unwrap();
        let mut call = vec![tool.clone()];
        call.extend(args.iter().map(|a| (*a).to_string()));
        state.calls.push(call);

        match tool.as_str() {
            "networksetup" => Ok(Self::networksetup(&mut state, args)),
            "lsof" => {
                if state.listeners.is_empty() {
                    return Ok(failed(""));
                }
                let out: String = state.listeners.iter().map(|p| format!("{p}\n")).collect();
                Ok(ok(&out))
            }
            "kill" => {
                let pid: u32 = args.last().and_then(|p| p.parse().ok()).unwrap_or(0);
                state.listeners.retain(|p| *p != pid);
                state.killed.push(pid);
                Ok(ok(""))
            }
            "security" => Ok(Self::security(&mut state, args)),
            _ => Err(not_found(program)),
        }
    }

    /// Only `security -i` reads stdin; each input line is one command.
    /// Recorded calls hold the argv, never the input.
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> std::io::Result<CommandOutput> {
        if !program.ends_with("security") || args != ["-i"] {
            return Err(not_found(program));
        }

        let mut state = self.state.lock().unwrap();
        let mut call = vec!["security".to_string()];
        call.extend(args.iter().map(|a| (*a).to_string()));
        state.calls.push(call);

        let mut last = ok("");
        for line in input.lines().filter(|l| !l.trim().is_empty()) {
            let words: Vec<&str> = line.split_whitespace().collect();
            last = Self::security(&mut state, &words);
        }
        Ok(last)
    }
}

fn not_found(program: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{program}: not found"),
    )
}

fn ok(output: &str) -> CommandOutput {
    CommandOutput {
        output: output.to_string(),
        exit_code: 0,
    }
}

fn failed(output: &str) -> CommandOutput {
    CommandOutput {
        output: output.to_string(),
        exit_code: 1,
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Scripted lifetime of a fake child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildBehavior {
    /// Runs until terminated.
    StayAlive,
    /// Exits on its own after the delay with the given code.
    ExitAfter(Duration, i32),
    /// `launch` fails.
    FailToSpawn,
}

/// Hands out [`FakeChild`]ren and records launch specs.
#[derive(Debug)]
pub struct FakeLauncher {
    behavior: Mutex<ChildBehavior>,
    launches: Mutex<Vec<LaunchSpec>>,
    crash_flags: Mutex<Vec<Arc<AtomicBool>>>,
    running: Arc<AtomicU32>,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub fn new(behavior: ChildBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            launches: Mutex::new(Vec::new()),
            crash_flags: Mutex::new(Vec::new()),
            running: Arc::new(AtomicU32::new(0)),
            next_pid: AtomicU32::new(4000),
        }
    }

    pub fn set_behavior(&self, behavior: ChildBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }

    /// Number of children that have not exited yet.
    pub fn running(&self) -> u32 {
        self.running.load(Ordering::SeqCst)
    }

    /// Makes every child launched so far exit with code 255.
    pub fn crash_all(&self) {
        for flag in self.crash_flags.lock().unwrap().iter() {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn ChildProcess>> {
        self.launches.lock().unwrap().push(spec.clone());
        let behavior = *self.behavior.lock().unwrap();
        if behavior == ChildBehavior::FailToSpawn {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ));
        }

        let crashed = Arc::new(AtomicBool::new(false));
        self.crash_flags.lock().unwrap().push(Arc::clone(&crashed));
        self.running.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(FakeChild {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            started: Instant::now(),
            behavior,
            terminated: false,
            crashed,
            exited: false,
            running: Arc::clone(&self.running),
        }))
    }
}

/// A child whose exit is driven by its [`ChildBehavior`].
#[derive(Debug)]
pub struct FakeChild {
    pid: u32,
    started: Instant,
    behavior: ChildBehavior,
    terminated: bool,
    crashed: Arc<AtomicBool>,
    exited: bool,
    running: Arc<AtomicU32>,
}

impl FakeChild {
    fn current_exit(&self) -> Option<i32> {
        if self.terminated {
            return Some(143);
        }
        if self.crashed.load(Ordering::SeqCst) {
            return Some(255);
        }
        match self.behavior {
            ChildBehavior::ExitAfter(delay, code) if self.started.elapsed() >= delay => Some(code),
            _ => None,
        }
    }

    fn mark_exited(&mut self) {
        if !self.exited {
            self.exited = true;
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl ChildProcess for FakeChild {
    fn id(&self) -> u32 {
        self.pid
    }

    fn try_exit_code(&mut self) -> std::io::Result<Option<i32>> {
        let code = self.current_exit();
        if code.is_some() {
            self.mark_exited();
        }
        Ok(code)
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        self.terminated = true;
        Ok(())
    }

    fn wait(&mut self) -> std::io::Result<i32> {
        loop {
            if let Some(code) = self.current_exit() {
                self.mark_exited();
                return Ok(code);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn diagnostics(&self) -> String {
        if self.crashed.load(Ordering::SeqCst) {
            "Connection closed by remote host".to_string()
        } else {
            String::new()
        }
    }
}
