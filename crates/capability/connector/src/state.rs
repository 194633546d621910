//! connector 状态与统计

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 生命周期状态。
///
/// `Created → Connecting → Connected → Subscribed → Reconnecting → Subscribed | Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorState {
    Created,
    Connecting,
    Connected,
    Subscribed,
    Reconnecting,
    Terminated,
}

impl ConnectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorState::Created => "Created",
            ConnectorState::Connecting => "Connecting",
            ConnectorState::Connected => "Connected",
            ConnectorState::Subscribed => "Subscribed",
            ConnectorState::Reconnecting => "Reconnecting",
            ConnectorState::Terminated => "Terminated",
        }
    }

    /// 只有 Subscribed 状态受理总线请求。
    pub fn accepts_requests(&self) -> bool {
        matches!(self, ConnectorState::Subscribed)
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个 connector 的统计快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectorStatsSnapshot {
    pub connect_attempts: u64,
    pub connect_retries: u64,
    pub sessions_established: u64,
    pub subscriptions_created: u64,
    pub subscription_failures: u64,
    pub transfer_recoveries: u64,
    pub requests_dispatched: u64,
    pub requests_unavailable: u64,
    pub values_published: u64,
}

/// 单个 connector 的统计，同时累加到进程级计数器。
#[derive(Debug, Default)]
pub struct ConnectorStats {
    connect_attempts: AtomicU64,
    connect_retries: AtomicU64,
    sessions_established: AtomicU64,
    subscriptions_created: AtomicU64,
    subscription_failures: AtomicU64,
    transfer_recoveries: AtomicU64,
    requests_dispatched: AtomicU64,
    requests_unavailable: AtomicU64,
    values_published: AtomicU64,
}

impl ConnectorStats {
    pub fn snapshot(&self) -> ConnectorStatsSnapshot {
        ConnectorStatsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_retries: self.connect_retries.load(Ordering::Relaxed),
            sessions_established: self.sessions_established.load(Ordering::Relaxed),
            subscriptions_created: self.subscriptions_created.load(Ordering::Relaxed),
            subscription_failures: self.subscription_failures.load(Ordering::Relaxed),
            transfer_recoveries: self.transfer_recoveries.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            requests_unavailable: self.requests_unavailable.load(Ordering::Relaxed),
            values_published: self.values_published.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_connect_attempt();
    }

    pub(crate) fn record_connect_retry(&self) {
        self.connect_retries.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_connect_retry();
    }

    pub(crate) fn record_session_established(&self) {
        self.sessions_established.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_session_established();
    }

    pub(crate) fn record_subscription_created(&self) {
        self.subscriptions_created.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_subscription_created();
    }

    pub(crate) fn record_subscription_failure(&self) {
        self.subscription_failures.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_subscription_failure();
    }

    pub(crate) fn record_transfer_recovery(&self) {
        self.transfer_recoveries.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_transfer_recovery();
    }

    pub(crate) fn record_request_dispatched(&self) {
        self.requests_dispatched.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_request_dispatched();
    }

    pub(crate) fn record_request_unavailable(&self) {
        self.requests_unavailable.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_request_unavailable();
    }

    pub(crate) fn record_value_published(&self) {
        self.values_published.fetch_add(1, Ordering::Relaxed);
        gw_telemetry::record_value_published();
    }
}
