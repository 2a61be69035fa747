use std::io::{self, BufRead, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{info, warn};

/// Cooperative stop flag, polled between folders, images and CSV files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Cancels when the operator presses Enter. No-op unless stdin is a terminal.
    pub fn watch_stdin(&self) {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return;
        }

        let token = self.clone();
        let spawned = thread::Builder::new()
            .name("cancel-watch".to_string())
            .spawn(move || {
                let mut line = String::new();
                if let Ok(read) = io::stdin().lock().read_line(&mut line) {
                    if read > 0 {
                        info!("stop requested, finishing current item");
                        token.cancel();
                    }
                }
            });

        if let Err(err) = spawned {
            warn!(error = %err, "failed to start cancellation watcher");
        } else {
            info!("press Enter to stop after the current item");
        }
    }
}
