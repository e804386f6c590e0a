// Proxy Control - Debouncer
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Cancellable delayed task.
//!
//! Every call (re)starts the delay window and replaces the pending argument.
//! When the window elapses with no further call, the action runs once, on a
//! thread of its own, with the most recent argument. Executions are not
//! mutually exclusive: a run may still be in flight when the next window
//! elapses.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

use crate::sync::lock;

enum Command<T> {
    Call(T),
    Cancel,
}

/// Delayed task that collapses rapid calls into one execution.
pub struct Debouncer<T: Send + 'static> {
    name: &'static str,
    sender: Mutex<Option<Sender<Command<T>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer running `action` `delay` after the last call.
    pub fn new<F>(name: &'static str, delay: Duration, action: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Command<T>>();
        let action: Arc<dyn Fn(T) + Send + Sync> = Arc::new(action);

        let worker = thread::Builder::new()
            .name(format!("{}-timer", name))
            .spawn(move || {
                let mut pending: Option<T> = None;
                loop {
                    let received = if pending.is_some() {
                        receiver.recv_timeout(delay)
                    } else {
                        receiver.recv().map_err(|_| RecvTimeoutError::Disconnected)
                    };

                    match received {
                        Ok(Command::Call(value)) => {
                            if pending.replace(value).is_some() {
                                debug!("{}: pending call superseded", name);
                            }
                        }
                        Ok(Command::Cancel) => {
                            if pending.take().is_some() {
                                debug!("{}: pending call cancelled", name);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if let Some(value) = pending.take() {
                                run(name, Arc::clone(&action), value);
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start {} timer: {}", name, e);
                None
            }
        };

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(worker),
        }
    }

    /// Schedule `value`, superseding any pending call.
    pub fn call(&self, value: T) {
        self.send(Command::Call(value));
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    fn send(&self, command: Command<T>) {
        let sender = lock(&self.sender, self.name);
        let sent = match sender.as_ref() {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        };
        if !sent {
            warn!("{}: timer is not running, call dropped", self.name);
        }
    }
}

fn run<T: Send + 'static>(name: &'static str, action: Arc<dyn Fn(T) + Send + Sync>, value: T) {
    debug!("{}: executing", name);
    let spawned = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || action(value));
    if let Err(e) = spawned {
        warn!("{}: failed to spawn execution: {}", name, e);
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        // Closing the channel ends the timer loop; a pending call is dropped.
        lock(&self.sender, self.name).take();
        if let Some(worker) = lock(&self.worker, self.name).take() {
            if worker.join().is_err() {
                warn!("{}: timer thread panicked", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(delay_ms: u64) -> (Debouncer<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let debouncer = Debouncer::new("test-debounce", Duration::from_millis(delay_ms), move |v| {
            sink.lock().unwrap().push(v);
        });
        (debouncer, seen)
    }

    #[test]
    fn test_rapid_calls_collapse_to_last() {
        let (debouncer, seen) = recorder(150);
        for v in 1..=5 {
            debouncer.call(v);
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(Duration::from_millis(500));
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[test]
    fn test_separate_windows_each_execute() {
        let (debouncer, seen) = recorder(50);
        debouncer.call(1);
        thread::sleep(Duration::from_millis(300));
        debouncer.call(2);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_cancel_drops_pending() {
        let (debouncer, seen) = recorder(100);
        debouncer.call(1);
        debouncer.cancel();
        thread::sleep(Duration::from_millis(300));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_does_not_block() {
        let (debouncer, seen) = recorder(10_000);
        debouncer.call(1);
        drop(debouncer);
        assert!(seen.lock().unwrap().is_empty());
    }
}
