use std::future::Future;

use log::{error, info, warn};
use tokio::task::JoinHandle;

use crate::error::WatchError;

/// Why the daemon stopped.
#[derive(Debug)]
pub enum Exit {
    Interrupted(&'static str),
    WatcherStopped,
    WatcherFailed(WatchError),
    WatcherPanicked(String),
}

impl Exit {
    pub fn code(&self) -> i32 {
        match self {
            Exit::Interrupted(_) => 0,
            Exit::WatcherStopped | Exit::WatcherFailed(_) | Exit::WatcherPanicked(_) => 1,
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix, with the signal name.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => return "SIGINT",
                    _ = term.recv() => return "SIGTERM",
                }
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    ctrl_c.await;
    "SIGINT"
}

/// Route panics through the logger so they end up next to everything else.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        error!("💥 {}", panic);
    }));
}

/// Wait for the watcher to end or for `shutdown` to fire, whichever is first.
///
/// On shutdown the watcher task is aborted. Nothing else is drained.
pub async fn supervise<F>(mut watcher: JoinHandle<Result<(), WatchError>>, shutdown: F) -> Exit
where
    F: Future<Output = &'static str>,
{
    let exit = tokio::select! {
        signal = shutdown => {
            watcher.abort();
            Exit::Interrupted(signal)
        }
        joined = &mut watcher => match joined {
            Ok(Ok(())) => Exit::WatcherStopped,
            Ok(Err(e)) => Exit::WatcherFailed(e),
            Err(e) => Exit::WatcherPanicked(e.to_string()),
        },
    };

    match &exit {
        Exit::Interrupted(signal) => info!("Received {}, shutting down", signal),
        Exit::WatcherStopped => warn!("Watcher stopped unexpectedly"),
        Exit::WatcherFailed(e) => error!("Watcher failed: {}", e),
        Exit::WatcherPanicked(e) => error!("Watcher task died: {}", e),
    }
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_signal_aborts_watcher() {
        let watcher = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok::<(), WatchError>(())
        });

        let exit = supervise(watcher, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            "SIGINT"
        })
        .await;

        assert!(matches!(exit, Exit::Interrupted("SIGINT")));
        assert_eq!(exit.code(), 0);
    }

    #[tokio::test]
    async fn test_watcher_failure_is_fatal() {
        let watcher = tokio::spawn(async { Err(WatchError::RootMissing(PathBuf::from("/srv/share"))) });
        let exit = supervise(watcher, std::future::pending()).await;

        assert!(matches!(exit, Exit::WatcherFailed(WatchError::RootMissing(_))));
        assert_ne!(exit.code(), 0);
    }

    #[tokio::test]
    async fn test_watcher_panic_is_fatal() {
        let watcher: JoinHandle<Result<(), WatchError>> = tokio::spawn(async {
            panic!("watcher exploded")
        });
        let exit = supervise(watcher, std::future::pending()).await;
        assert!(matches!(exit, Exit::WatcherPanicked(_)));
        assert_eq!(exit.code(), 1);
    }
}
