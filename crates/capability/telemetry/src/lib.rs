//! 追踪初始化、请求 ID 与进程级计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, fmt};

/// connector 任务所在 span 的名称，过滤指令按它定位单个 connector。
pub const CONNECTOR_SPAN: &str = "connector";

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub connect_retries: u64,
    pub sessions_established: u64,
    pub subscriptions_created: u64,
    pub subscription_failures: u64,
    pub transfer_recoveries: u64,
    pub requests_dispatched: u64,
    pub requests_unavailable: u64,
    pub values_published: u64,
    pub decode_failures: u64,
}

/// 进程级计数器。
pub struct GatewayMetrics {
    connect_attempts: AtomicU64,
    connect_retries: AtomicU64,
    sessions_established: AtomicU64,
    subscriptions_created: AtomicU64,
    subscription_failures: AtomicU64,
    transfer_recoveries: AtomicU64,
    requests_dispatched: AtomicU64,
    requests_unavailable: AtomicU64,
    values_published: AtomicU64,
    decode_failures: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            connect_attempts: AtomicU64::new(0),
            connect_retries: AtomicU64::new(0),
            sessions_established: AtomicU64::new(0),
            subscriptions_created: AtomicU64::new(0),
            subscription_failures: AtomicU64::new(0),
            transfer_recoveries: AtomicU64::new(0),
            requests_dispatched: AtomicU64::new(0),
            requests_unavailable: AtomicU64::new(0),
            values_published: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            connect_retries: self.connect_retries.load(Ordering::Relaxed),
            sessions_established: self.sessions_established.load(Ordering::Relaxed),
            subscriptions_created: self.subscriptions_created.load(Ordering::Relaxed),
            subscription_failures: self.subscription_failures.load(Ordering::Relaxed),
            transfer_recoveries: self.transfer_recoveries.load(Ordering::Relaxed),
            requests_dispatched: self.requests_dispatched.load(Ordering::Relaxed),
            requests_unavailable: self.requests_unavailable.load(Ordering::Relaxed),
            values_published: self.values_published.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<GatewayMetrics> = OnceLock::new();

/// 获取全局计数器实例。
pub fn metrics() -> &'static GatewayMetrics {
    METRICS.get_or_init(GatewayMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    init_tracing_with(&[]);
}

/// 初始化 tracing，并追加额外的过滤指令（例如 connector 级别）。
///
/// 无法解析的指令被忽略；重复初始化是空操作。
pub fn init_tracing_with(directives: &[String]) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in directives {
        if let Ok(parsed) = directive.parse::<Directive>() {
            filter = filter.add_directive(parsed);
        }
    }
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 单个 connector 的日志级别指令，例如 `[connector{id=dev1}]=debug`。
pub fn connector_directive(connector_id: &str, level: &str) -> String {
    format!("[{CONNECTOR_SPAN}{{id={connector_id}}}]={level}")
}

/// 生成新的请求 ID。
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录一次连接尝试。
pub fn record_connect_attempt() {
    metrics().connect_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次连接失败后的重试。
pub fn record_connect_retry() {
    metrics().connect_retries.fetch_add(1, Ordering::Relaxed);
}

pub fn record_session_established() {
    metrics()
        .sessions_established
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_subscription_created() {
    metrics()
        .subscriptions_created
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅创建失败（不会自动重试）。
pub fn record_subscription_failure() {
    metrics()
        .subscription_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一次订阅转移失败后的恢复。
pub fn record_transfer_recovery() {
    metrics()
        .transfer_recoveries
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_request_dispatched() {
    metrics().requests_dispatched.fetch_add(1, Ordering::Relaxed);
}

/// 记录因 connector 未就绪被拒绝的请求。
pub fn record_request_unavailable() {
    metrics()
        .requests_unavailable
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_value_published() {
    metrics().values_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录被丢弃的无法解码的消息。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}
