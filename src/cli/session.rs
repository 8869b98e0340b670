//! Foreground session: the controller worker plus a line-oriented front end.
//!
//! Commands are read from stdin, worker events are printed as they arrive,
//! and a reconcile tick runs once per second. The session cleans up on
//! `quit`, end of input, SIGINT or SIGTERM.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::Result;

use crate::constants;
use crate::core::controller::ProxyController;
use crate::core::service::{self, Command};
use crate::logger;
use crate::message::Message;

const INPUT_POLL_MS: u64 = 100;
const LOG_TAIL: usize = 20;

/// One line typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Command(Command),
    Logs,
    Help,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        ["enable" | "on"] => Input::Command(Command::Enable),
        ["disable" | "off"] => Input::Command(Command::Disable),
        ["route-all" | "toggle"] => Input::Command(Command::ToggleRouteAll),
        ["route-all", "on"] => Input::Command(Command::SetRouteAll(true)),
        ["route-all", "off"] => Input::Command(Command::SetRouteAll(false)),
        ["status"] => Input::Command(Command::Status),
        ["cleanup"] => Input::Command(Command::Cleanup),
        ["logs"] => Input::Logs,
        ["help" | "?"] => Input::Help,
        ["quit" | "exit" | "q"] => Input::Quit,
        _ => return None,
    };
    Some(input)
}

/// Runs the session until the user quits or a signal arrives.
///
/// # Errors
///
/// Currently always succeeds; failures of individual commands are printed.
pub fn run(controller: ProxyController, enable: bool) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        }) {
            crate::log_warning!("CLI", "Could not install Ctrl+C handler: {e}");
        }
    }

    let (events_tx, events) = mpsc::channel();
    let handle = service::spawn(controller, events_tx);
    let lines = spawn_stdin_reader();

    println!("{}", constants::MSG_SESSION_HELP);
    if enable {
        handle.send(Command::Enable);
    }

    let tick_rate = Duration::from_millis(constants::DEFAULT_TICK_RATE_MS);
    let mut last_tick = Instant::now();

    loop {
        for message in events.try_iter() {
            render(&message);
        }
        if shutdown.load(Ordering::SeqCst) {
            crate::log_info!("CLI", "Signal received, shutting down");
            break;
        }

        match lines.recv_timeout(Duration::from_millis(INPUT_POLL_MS)) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => match parse_input(&line) {
                Some(Input::Command(command)) => {
                    handle.send(command);
                }
                Some(Input::Logs) => print_logs(),
                Some(Input::Help) => println!("{}", constants::MSG_SESSION_HELP),
                Some(Input::Quit) => break,
                None => eprintln!(
                    "Unknown command '{}'. {}",
                    line.trim(),
                    constants::MSG_SESSION_HELP
                ),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                crate::log_info!("CLI", "End of input, shutting down");
                break;
            }
        }

        if last_tick.elapsed() >= tick_rate {
            handle.send(Command::Reconcile);
            last_tick = Instant::now();
        }
    }

    println!("Cleaning up...");
    handle.shutdown();
    for message in events.try_iter() {
        render(&message);
    }
    Ok(())
}

fn render(message: &Message) {
    match message {
        Message::StateChanged(state) => println!(
            "Proxy {} | routing: {}",
            if state.proxy_active {
                "ACTIVE"
            } else {
                "inactive"
            },
            if state.route_all {
                "all traffic"
            } else {
                "whitelist"
            }
        ),
        Message::OperationFailed {
            operation,
            message,
            setup_required,
        } => {
            eprintln!("{operation} failed: {message}");
            if *setup_required {
                eprintln!("{}", constants::MSG_SETUP_HINT);
            }
        }
        Message::Status(report) => println!("{report}"),
        Message::TunnelLost => {
            eprintln!("SSH tunnel exited unexpectedly; system proxy settings were cleared.");
        }
        Message::Stopped => println!("Stopped."),
    }
}

fn print_logs() {
    let logs = logger::get_logs();
    let start = logs.len().saturating_sub(LOG_TAIL);
    for entry in &logs[start..] {
        println!("{}", entry.format());
    }
}

/// Forwards stdin lines; the channel disconnects at end of input.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("enable"), Some(Input::Command(Command::Enable)));
        assert_eq!(parse_input("  off "), Some(Input::Command(Command::Disable)));
        assert_eq!(
            parse_input("route-all"),
            Some(Input::Command(Command::ToggleRouteAll))
        );
        assert_eq!(
            parse_input("route-all on"),
            Some(Input::Command(Command::SetRouteAll(true)))
        );
        assert_eq!(parse_input("status"), Some(Input::Command(Command::Status)));
        assert_eq!(parse_input("logs"), Some(Input::Logs));
        assert_eq!(parse_input("quit"), Some(Input::Quit));
        assert_eq!(parse_input("route-all maybe"), None);
        assert_eq!(parse_input("reboot"), None);
    }
}
