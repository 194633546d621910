//! 协议 connector
//!
//! 一个 connector 对应一个上游连接：
//!
//! - 生命周期：连接（固定间隔无限重试）→ 创建订阅（不重试）→ 绑定 7 个总线操作 → 公布发现记录
//! - 订阅转移失败时删除全部监控项并重建订阅
//! - `stop()`：先注销总线处理者，再断开连接
//!
//! 底层客户端库通过 [`ClientConnector`] / [`Session`] 注入，[`simulated`] 提供进程内实现。

pub mod client;
pub mod connector;
pub mod error;
pub mod handler;
pub mod opcua;
pub mod retry;
pub mod simulated;
pub mod state;
pub mod subscription;
pub mod timed;

pub use client::{
    ClientConnector, ClientSettings, EndpointDescription, MonitoredItemRequest,
    MonitoredItemResult, Session, SessionEvent, select_endpoint,
};
pub use connector::{Connector, ConnectorContext, ConnectorHandle};
pub use error::{ClientError, ConnectorError};
pub use handler::{HandlerContext, HandlerResult, ProtocolHandler};
pub use opcua::OpcUaHandler;
pub use retry::{RetryDecision, RetryTimer};
pub use simulated::{SimulatedClient, SimulatedServer};
pub use state::{ConnectorState, ConnectorStatsSnapshot};
pub use subscription::{SubscriptionHandle, TopicRegistry};
pub use timed::TimedSession;
