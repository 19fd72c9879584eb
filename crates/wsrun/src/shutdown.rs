//! Turning termination signals into cancellation of the running command

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Install signal handlers for graceful shutdown
///
/// The first SIGINT or SIGTERM (Ctrl+C or Ctrl+Break on Windows) cancels
/// `token`. The executor then stops dispatching and terminates running jobs.
pub fn install_signal_handlers(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            () = wait_for_signal() => token.cancel(),
            () = token.cancelled() => {}
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, stopping jobs");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, stopping jobs");
        }
    }
}

#[cfg(windows)]
async fn wait_for_signal() {
    use tokio::signal::windows;

    let (mut ctrl_c, mut ctrl_break) = match (windows::ctrl_c(), windows::ctrl_break()) {
        (Ok(ctrl_c), Ok(ctrl_break)) => (ctrl_c, ctrl_break),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to install console handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = ctrl_c.recv() => {
            info!("Received Ctrl+C, stopping jobs");
        }
        _ = ctrl_break.recv() => {
            info!("Received Ctrl+Break, stopping jobs");
        }
    }
}

#[cfg(not(any(unix, windows)))]
async fn wait_for_signal() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handlers_leave_token_untouched() {
        let token = CancellationToken::new();
        install_signal_handlers(token.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!token.is_cancelled());
        token.cancel();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_cancels_token() {
        let token = CancellationToken::new();
        install_signal_handlers(token.clone());
        // Let the handler task register before raising.
        tokio::time::sleep(Duration::from_millis(50)).await;

        #[expect(unsafe_code, reason = "Raising a signal at ourselves")]
        let status = unsafe { libc::raise(libc::SIGTERM) };
        assert_eq!(status, 0);

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
    }
}
