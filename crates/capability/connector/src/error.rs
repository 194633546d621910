//! 连接错误类型定义

use domain::StatusCode;

/// 底层客户端库返回的错误，在 connector 边界转换为状态迁移、日志或总线错误应答。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// 连接失败
    #[error("connection error: {0}")]
    Connection(String),

    /// 超时
    #[error("timeout: {0}")]
    Timeout(String),

    /// 没有满足安全策略的端点
    #[error("no endpoint matches security policy {0}")]
    NoMatchingEndpoint(String),

    /// 服务调用返回错误状态
    #[error("service error {0}: {1}")]
    Service(StatusCode, String),

    /// 会话已关闭
    #[error("session closed")]
    SessionClosed,
}

/// connector 构造与停止错误。
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// 配置非法，connector 不会启动
    #[error("invalid configuration: {0}")]
    Config(#[from] gw_config::ConfigError),

    /// 生命周期任务异常退出
    #[error("connector task failed: {0}")]
    Join(String),
}
