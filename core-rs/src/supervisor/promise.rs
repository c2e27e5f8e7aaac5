//! Single-assignment hand-off of the launched process id
//!
//! The launch worker owns the [`LaunchPublisher`] and resolves it exactly
//! once. If the publisher is dropped unresolved (the worker never ran or
//! panicked) the promise resolves to [`LaunchOutcome::NotLaunched`], so a
//! waiter can never block forever on a worker that is gone.

use once_cell::sync::OnceCell;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched { pid: u32 },
    NotLaunched(String),
}

impl LaunchOutcome {
    pub fn pid(&self) -> Option<u32> {
        match self {
            LaunchOutcome::Launched { pid } => Some(*pid),
            LaunchOutcome::NotLaunched(_) => None,
        }
    }
}

const ABANDONED: &str = "launch worker ended without publishing a process id";

/// Create a connected publisher/promise pair
pub fn launch_promise() -> (LaunchPublisher, LaunchPromise) {
    let (sender, receiver) = mpsc::sync_channel(1);
    (
        LaunchPublisher { sender },
        LaunchPromise {
            receiver: Mutex::new(receiver),
            outcome: OnceCell::new(),
        },
    )
}

/// Write side, consumed by its single use
#[derive(Debug)]
pub struct LaunchPublisher {
    sender: SyncSender<LaunchOutcome>,
}

impl LaunchPublisher {
    pub fn publish(self, outcome: LaunchOutcome) {
        // Capacity 1 and a single send, so this never blocks
        let _ = self.sender.send(outcome);
    }
}

/// Read side, resolved once and cached
#[derive(Debug)]
pub struct LaunchPromise {
    receiver: Mutex<Receiver<LaunchOutcome>>,
    outcome: OnceCell<LaunchOutcome>,
}

impl LaunchPromise {
    /// Block until the outcome is known
    pub fn wait(&self) -> &LaunchOutcome {
        self.outcome.get_or_init(|| {
            let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver
                .recv()
                .unwrap_or_else(|_| LaunchOutcome::NotLaunched(ABANDONED.to_string()))
        })
    }

    /// Outcome if already resolved, without blocking
    pub fn try_get(&self) -> Option<&LaunchOutcome> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome);
        }

        let received = {
            let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
            match receiver.try_recv() {
                Ok(outcome) => outcome,
                Err(TryRecvError::Disconnected) => LaunchOutcome::NotLaunched(ABANDONED.to_string()),
                Err(TryRecvError::Empty) => return None,
            }
        };

        Some(self.outcome.get_or_init(|| received))
    }
}
