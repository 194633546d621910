//! 总线错误类型定义

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// 地址已有处理者
    #[error("address already registered: {0}")]
    AddressInUse(String),

    /// 地址没有处理者
    #[error("no handler registered for {0}")]
    NoHandler(String),

    /// 处理者收到请求后未应答
    #[error("handler for {0} dropped the request")]
    HandlerDropped(String),

    #[error("lock failed")]
    LockPoisoned,
}
