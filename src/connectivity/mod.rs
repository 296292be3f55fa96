//! Connectivity monitor
//!
//! Owns the process-wide online flag. Platform signals arrive on a channel;
//! coming back online starts a debounce window and, if the connection holds
//! for the whole window, exactly one queue flush runs. Going offline only
//! flips the flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::config::ConnectivityConfig;
use crate::error::Result;
use crate::queue::{ActionQueue, FlushReport};

const SIGNAL_BUFFER: usize = 32;

/// Shared read handle on the online flag.
///
/// Clones observe the same flag. Only the monitor writes it.
#[derive(Debug, Clone)]
pub struct ConnectivityState {
    online: Arc<AtomicBool>,
}

impl ConnectivityState {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns the previous value
    pub(crate) fn set(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A platform-level connectivity event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivitySignal {
    Online,
    Offline,
    /// The app came back to the foreground
    Visible,
}

/// Result of a flush the monitor triggered
pub type FlushOutcome = Result<FlushReport>;

pub struct ConnectivityMonitor {
    state: ConnectivityState,
    queue: Arc<ActionQueue>,
    debounce: Duration,
    reports: Option<mpsc::UnboundedSender<FlushOutcome>>,
}

impl ConnectivityMonitor {
    pub fn new(state: ConnectivityState, queue: Arc<ActionQueue>, config: &ConnectivityConfig) -> Self {
        Self {
            state,
            queue,
            debounce: config.debounce(),
            reports: None,
        }
    }

    /// Send the outcome of every triggered flush to `reports`
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<FlushOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn state(&self) -> ConnectivityState {
        self.state.clone()
    }

    /// Run the monitor on its own task
    pub fn spawn(self) -> (mpsc::Sender<ConnectivitySignal>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    /// Consume signals until every sender is dropped
    pub async fn run(self, mut signals: mpsc::Receiver<ConnectivitySignal>) {
        let mut pending_flush: Option<Instant> = None;

        loop {
            let deadline = pending_flush;
            let window = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                signal = signals.recv() => {
                    let Some(signal) = signal else {
                        debug!("Connectivity signal channel closed");
                        break;
                    };
                    pending_flush = self.on_signal(signal, pending_flush);
                }
                _ = window => {
                    pending_flush = None;
                    self.trigger_flush();
                }
            }
        }
    }

    fn on_signal(&self, signal: ConnectivitySignal, pending: Option<Instant>) -> Option<Instant> {
        match signal {
            ConnectivitySignal::Online => {
                if self.state.set(true) {
                    debug!("Already online, ignoring duplicate signal");
                    return pending;
                }
                info!("Connection restored");
                Some(Instant::now() + self.debounce)
            }
            ConnectivitySignal::Offline => {
                if self.state.set(false) {
                    info!("Connection lost");
                }
                if pending.is_some() {
                    debug!("Cancelled pending flush");
                }
                None
            }
            ConnectivitySignal::Visible => {
                if !self.state.is_online() || pending.is_some() {
                    return pending;
                }
                Some(Instant::now() + self.debounce)
            }
        }
    }

    fn trigger_flush(&self) {
        let queue = self.queue.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            let outcome = queue.flush().await;
            match &outcome {
                Ok(report) if report.coalesced => debug!("Flush already running"),
                Ok(report) => debug!("Triggered flush attempted {} actions", report.attempted()),
                Err(e) => warn!("Triggered flush failed: {}", e),
            }
            if let Some(reports) = reports {
                let _ = reports.send(outcome);
            }
        });
    }
}
