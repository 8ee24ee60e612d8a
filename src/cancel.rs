use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::error::KiraError;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), KiraError> {
        if self.is_cancelled() {
            return Err(KiraError::Interrupted);
        }
        Ok(())
    }
}

pub fn install_interrupt_handler() -> Result<CancelToken, KiraError> {
    let token = CancelToken::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| KiraError::Filesystem(format!("signal runtime: {err}")))?;
    let watcher = token.clone();
    thread::Builder::new()
        .name("kira-geo-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                tracing::warn!("interrupt received; stopping after in-flight downloads");
                watcher.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::error!("second interrupt; exiting now");
                    std::process::exit(130);
                }
            });
        })
        .map_err(|err| KiraError::Filesystem(format!("signal watcher: {err}")))?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(token.check().is_ok());
        other.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(KiraError::Interrupted)));
    }
}
