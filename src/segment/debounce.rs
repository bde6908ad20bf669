//! Quiet-window debouncing for point-driven inference.
//!
//! Producers push every new prompt set; the consumer only sees the last value
//! once no new value arrived for the whole quiet window. A newer value
//! restarts the window, and [`DebounceSender::cancel`] drops a pending value
//! that has not been emitted yet. Values already emitted are never recalled.

use tokio::{
    sync::mpsc,
    time::{Duration, Instant},
};

/// Reference quiet window for prompt edits.
pub const DEFAULT_QUIET_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Signal<T> {
    Value(T),
    Cancel,
}

/// The receiving half was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceClosed;

/// Producer half of a debounce channel.
#[derive(Debug)]
pub struct DebounceSender<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
}

impl<T> Clone for DebounceSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> DebounceSender<T> {
    /// Replaces the pending value and restarts the quiet window.
    pub fn send(&self, value: T) -> Result<(), DebounceClosed> {
        self.tx.send(Signal::Value(value)).map_err(|_| DebounceClosed)
    }

    /// Drops the pending value, if any.
    pub fn cancel(&self) -> Result<(), DebounceClosed> {
        self.tx.send(Signal::Cancel).map_err(|_| DebounceClosed)
    }
}

/// Consumer half of a debounce channel.
#[derive(Debug)]
pub struct Debounced<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    quiet: Duration,
    pending: Option<T>,
    deadline: Instant,
}

impl<T> Debounced<T> {
    /// Waits for the next settled value.
    ///
    /// Returns `None` once every sender is gone; a value still inside its
    /// quiet window at that point is discarded.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(Signal::Value(value)) => {
                        self.pending = Some(value);
                        self.deadline = Instant::now() + self.quiet;
                    }
                    Some(Signal::Cancel) => {
                        if self.pending.take().is_some() {
                            log::debug!("debounce: pending request canceled");
                        }
                    }
                    None => return None,
                },
                _ = tokio::time::sleep_until(deadline), if self.pending.is_some() => {
                    return self.pending.take();
                }
            }
        }
    }

    pub fn quiet_window(&self) -> Duration {
        self.quiet
    }
}

/// Creates a debounce channel with the given quiet window.
pub fn debounce_channel<T>(quiet: Duration) -> (DebounceSender<T>, Debounced<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DebounceSender { tx },
        Debounced {
            rx,
            quiet,
            pending: None,
            deadline: Instant::now(),
        },
    )
}
