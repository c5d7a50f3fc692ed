//! Interrupt handling.
//!
//! The first SIGINT / SIGTERM / SIGHUP cancels the returned
//! [`CancellationToken`]: the pipeline stops admitting items, abandons
//! in-flight fetches and lets queued merges finish. A second signal exits the
//! process immediately with status 130.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status used when the run is interrupted.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

/// What to do about a received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel the run and let it wind down.
    Cancel,
    /// Repeated signal: exit now.
    ForceExit,
}

/// Counts received signals and maps them to actions.
#[derive(Debug, Default)]
pub struct SignalCounter {
    received: AtomicU32,
}

impl SignalCounter {
    /// Creates a counter with no signals seen.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one signal, cancelling `token` on the first.
    pub fn record(&self, token: &CancellationToken) -> SignalAction {
        if self.received.fetch_add(1, Ordering::SeqCst) == 0 {
            token.cancel();
            SignalAction::Cancel
        } else {
            SignalAction::ForceExit
        }
    }
}

/// Spawns the signal listener and returns the token it cancels.
///
/// Must be called from within a tokio runtime.
#[must_use]
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();

    tokio::spawn(async move {
        let counter = SignalCounter::new();
        let mut signals = Signals::register();
        loop {
            signals.recv().await;
            match counter.record(&handler_token) {
                SignalAction::Cancel => {
                    info!("received shutdown signal, finishing queued merges...");
                    info!("press Ctrl+C again to force exit");
                }
                SignalAction::ForceExit => {
                    warn!("force exit requested");
                    std::process::exit(i32::from(INTERRUPTED_EXIT_CODE));
                }
            }
        }
    });

    token
}

/// Signal streams, registered once and reused.
struct Signals {
    #[cfg(unix)]
    terminate: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    hangup: Option<tokio::signal::unix::Signal>,
}

impl Signals {
    fn register() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let register = |kind: SignalKind, name: &str| match signal(kind) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!(signal = name, error = %e, "failed to register signal handler");
                    None
                }
            };
            Self {
                terminate: register(SignalKind::terminate(), "SIGTERM"),
                hangup: register(SignalKind::hangup(), "SIGHUP"),
            }
        }

        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c() => {}
                () = recv_optional(self.terminate.as_mut()) => {}
                () = recv_optional(self.hangup.as_mut()) => {}
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c().await;
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn recv_optional(signal: Option<&mut tokio::signal::unix::Signal>) {
    match signal {
        Some(signal) => {
            if signal.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
