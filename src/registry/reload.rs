//! Full-reload trigger scheduling.
//!
//! An expired or unreadable credential cannot be fixed from inside the
//! realtime layer. The only remedy is reloading the application so the
//! user re-authenticates. [`Reloader`] fires the environment's
//! [`ReloadTrigger`] after a short delay, at most once per registry.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Environment primitive that reloads the application.
pub trait ReloadTrigger: Send + Sync + fmt::Debug {
    /// Reloads the application.
    fn reload(&self);
}

/// [`ReloadTrigger`] that wakes a task awaiting [`NotifyReload::requested`].
#[derive(Debug, Default)]
pub struct NotifyReload {
    notify: Notify,
}

impl NotifyReload {
    /// Creates a trigger nobody is waiting on yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completes once a reload has been requested.
    pub async fn requested(&self) {
        self.notify.notified().await;
    }
}

impl ReloadTrigger for NotifyReload {
    fn reload(&self) {
        self.notify.notify_one();
    }
}

/// Delayed, once-only reload scheduling.
#[derive(Debug, Clone)]
pub struct Reloader {
    trigger: Arc<dyn ReloadTrigger>,
    delay: Duration,
    scheduled: Arc<AtomicBool>,
}

impl Reloader {
    /// Creates a reloader firing `trigger` `delay` after scheduling.
    #[must_use]
    pub fn new(trigger: Arc<dyn ReloadTrigger>, delay: Duration) -> Self {
        Self {
            trigger,
            delay,
            scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedules the reload. Returns `false` if one is already scheduled.
    ///
    /// Outside a Tokio runtime the trigger fires immediately.
    pub fn schedule(&self) -> bool {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::warn!(delay = ?self.delay, "session unrecoverable, scheduling reload");

        let trigger = Arc::clone(&self.trigger);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let delay = self.delay;
                handle.spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    trigger.reload();
                });
            }
            Err(_) => trigger.reload(),
        }
        true
    }

    /// Returns `true` once a reload has been scheduled.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::SeqCst)
    }
}
