//! # Shutdown signals.
//!
//! [`wait_for_shutdown_signal`] resolves on the first termination signal and
//! reports which one arrived. [`SchedulerHandle::shutdown_on_signal`](crate::SchedulerHandle::shutdown_on_signal)
//! builds on it.
//!
//! | Platform | Signals                       |
//! |----------|-------------------------------|
//! | unix     | `SIGINT`, `SIGTERM`, `SIGQUIT` |
//! | other    | Ctrl-C                        |

/// Waits for a termination signal and returns its name.
///
/// Listeners are registered per call. Fails if registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let received = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = received, "shutdown signal received");
    Ok(received)
}

/// Waits for Ctrl-C and returns `"ctrl-c"`.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "shutdown signal received");
    Ok("ctrl-c")
}
