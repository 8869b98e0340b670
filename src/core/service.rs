//! Serialized access to the controller.
//!
//! One worker thread owns the [`ProxyController`] and runs queued commands to
//! completion, one at a time. Enabling waits out the tunnel grace period on
//! that thread, so callers never block on it.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use super::controller::ProxyController;
use super::error::Error;
use crate::logger::{self, LogLevel};
use crate::message::Message;
use crate::state::ProxyState;

/// Operations accepted by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enable,
    Disable,
    ToggleRouteAll,
    SetRouteAll(bool),
    Cleanup,
    Reconcile,
    Status,
    /// Clean up, then stop the worker.
    Shutdown,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "enable"),
            Self::Disable => write!(f, "disable"),
            Self::ToggleRouteAll => write!(f, "toggle route-all"),
            Self::SetRouteAll(on) => write!(f, "route-all {}", if *on { "on" } else { "off" }),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Reconcile => write!(f, "reconcile"),
            Self::Status => write!(f, "status"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Front-end side of the worker. Dropping it shuts the worker down.
pub struct ControllerHandle {
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Queues a command. Returns `false` if the worker is gone.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Cleans up and waits for the worker to exit.
    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                logger::log(LogLevel::Error, "CONTROL", "Controller worker panicked");
            }
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Bootstraps `controller` on a new worker thread and returns its handle.
///
/// State changes, failures and status answers are delivered on `events`.
pub fn spawn(mut controller: ProxyController, events: Sender<Message>) -> ControllerHandle {
    let (tx, rx) = mpsc::channel::<Command>();

    let worker = std::thread::spawn(move || {
        let state_events = events.clone();
        controller.subscribe(Box::new(move |state: &ProxyState| {
            let _ = state_events.send(Message::StateChanged(*state));
        }));
        controller.bootstrap();
        run(&mut controller, &rx, &events);
    });

    ControllerHandle {
        tx,
        worker: Some(worker),
    }
}

fn run(controller: &mut ProxyController, rx: &Receiver<Command>, events: &Sender<Message>) {
    loop {
        // A dropped sender counts as shutdown
        let command = rx.recv().unwrap_or(Command::Shutdown);
        logger::log(LogLevel::Debug, "CONTROL", format!("Command: {command}"));

        let result = match command {
            Command::Enable => controller.enable(),
            Command::Disable => {
                controller.disable();
                Ok(())
            }
            Command::ToggleRouteAll => controller.toggle_route_all(),
            Command::SetRouteAll(on) => controller.set_route_all(on),
            Command::Cleanup => {
                controller.cleanup();
                Ok(())
            }
            Command::Reconcile => {
                if controller.reconcile() {
                    let _ = events.send(Message::TunnelLost);
                }
                Ok(())
            }
            Command::Status => {
                let _ = events.send(Message::Status(Box::new(controller.status())));
                Ok(())
            }
            Command::Shutdown => {
                controller.cleanup();
                let _ = events.send(Message::Stopped);
                return;
            }
        };

        if let Err(e) = result {
            let level = if e.is_validation() {
                LogLevel::Warning
            } else {
                LogLevel::Error
            };
            logger::log(level, "CONTROL", format!("{command} failed: {e}"));
            let _ = events.send(Message::OperationFailed {
                operation: command,
                message: e.to_string(),
                setup_required: matches!(e, Error::CredentialsOrSettingsMissing(_)),
            });
        }
    }
}
