//! OS signal handling.
//!
//! # Responsibilities
//! - Register the termination signals (SIGINT, SIGTERM, SIGHUP, SIGQUIT)
//! - Resolve on the first one received
//!
//! # Design Decisions
//! - SIGKILL and SIGILL cannot be caught and are not registered
//! - A signal that cannot be registered is logged and skipped; the rest
//!   still work

use futures_util::future::{select_all, FutureExt};
use tokio::signal::unix::{signal, SignalKind};

fn termination_signals() -> [(&'static str, SignalKind); 4] {
    [
        ("SIGINT", SignalKind::interrupt()),
        ("SIGTERM", SignalKind::terminate()),
        ("SIGHUP", SignalKind::hangup()),
        ("SIGQUIT", SignalKind::quit()),
    ]
}

/// Wait until one of the termination signals arrives.
///
/// Returns the signal name. If nothing could be registered this never
/// resolves, leaving the service as the only way to stop.
pub async fn wait_for_termination() -> &'static str {
    let mut streams = Vec::new();
    for (name, kind) in termination_signals() {
        match signal(kind) {
            Ok(stream) => streams.push((name, stream)),
            Err(e) => tracing::warn!(signal = name, error = %e, "Failed to register signal handler"),
        }
    }

    if streams.is_empty() {
        tracing::warn!("No signal handlers registered");
        return std::future::pending().await;
    }

    let waits = streams
        .iter_mut()
        .map(|(name, stream)| {
            let name: &'static str = *name;
            async move {
                stream.recv().await;
                name
            }
            .boxed()
        })
        .collect::<Vec<_>>();

    let (name, _, _) = select_all(waits).await;
    tracing::info!(signal = name, "Received termination signal");
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_termination_signal_registers() {
        for (name, kind) in termination_signals() {
            assert!(signal(kind).is_ok(), "{name} was refused");
        }
    }

    #[tokio::test]
    async fn illegal_instruction_is_refused() {
        assert!(signal(SignalKind::from_raw(nix::sys::signal::Signal::SIGILL as i32)).is_err());
    }
}
