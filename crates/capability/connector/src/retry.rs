//! 连接重试定时器

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 一次等待的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 间隔已过，继续重连
    Reconnect,
    /// 等待期间被取消
    Cancelled,
    /// 定时器已触发，但 connector 在此之前已被停止
    Disposed,
}

/// 固定间隔、可取消的重试定时器。
///
/// 定时器触发与 `stop()` 可能同时发生，触发后在重连之前再检查一次 disposed 标志。
#[derive(Debug, Clone)]
pub struct RetryTimer {
    delay: Duration,
    cancel: CancellationToken,
    disposed: Arc<AtomicBool>,
}

impl RetryTimer {
    pub fn new(delay: Duration, cancel: CancellationToken, disposed: Arc<AtomicBool>) -> Self {
        Self {
            delay,
            cancel,
            disposed,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// 等待一个重试间隔。
    pub async fn wait(&self) -> RetryDecision {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return RetryDecision::Cancelled,
            _ = tokio::time::sleep(self.delay) => {}
        }
        if self.is_disposed() {
            RetryDecision::Disposed
        } else {
            RetryDecision::Reconnect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let timer = RetryTimer::new(
            Duration::from_millis(5000),
            CancellationToken::new(),
            Arc::new(AtomicBool::new(false)),
        );
        let started = tokio::time::Instant::now();
        assert_eq!(timer.wait().await, RetryDecision::Reconnect);
        assert!(started.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_sleep() {
        let cancel = CancellationToken::new();
        let timer = RetryTimer::new(
            Duration::from_millis(5000),
            cancel.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        cancel.cancel();
        assert_eq!(timer.wait().await, RetryDecision::Cancelled);
    }
}
