// Proxy Control - Notifications
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! User-visible notifications. Fire-and-forget: delivery failures are
//! logged and swallowed.

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

use crate::models::APP_NAME;

/// Best-effort message sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!("{}", message);
    }
}

/// Desktop notifications through `notify-send`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, message: &str) {
        info!("{}", message);
        let message = message.to_string();
        let spawned = thread::Builder::new()
            .name("notify-send".to_string())
            .spawn(move || {
                let status = Command::new("notify-send")
                    .args(["--app-name", APP_NAME, APP_NAME, &message])
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                match status {
                    Ok(s) if !s.success() => debug!("notify-send exited with {}", s),
                    Err(e) => debug!("notify-send unavailable: {}", e),
                    _ => {}
                }
            });
        if let Err(e) = spawned {
            debug!("Failed to spawn notification: {}", e);
        }
    }
}

/// Pick the notifier for the `show_notifications` setting.
pub fn for_settings(show_notifications: bool) -> Arc<dyn Notifier> {
    if show_notifications {
        Arc::new(DesktopNotifier)
    } else {
        Arc::new(LogNotifier)
    }
}
