//! 底层客户端库契约
//!
//! 线上协议本身由客户端库实现，connector 只依赖这里的 trait：
//!
//! - [`ClientConnector`]：按 [`ClientSettings`] 建立会话
//! - [`Session`]：一次活动连接上的订阅、监控项、读写与浏览服务
//!
//! 会话通过 [`SessionEvent`] 广播故障、连接状态与数据变化通知。

use crate::error::ClientError;
use api_contract::{BrowseEntry, ServerInfo};
use async_trait::async_trait;
use domain::{BuiltinType, StatusCode, Value, Variant};
use gw_config::{ConnectorConfig, DataChangeTrigger, Identity, SecurityPolicy};
use gw_security::SecurityContext;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

pub type SubscriptionId = u32;
pub type MonitoredItemId = u32;

/// 建立会话所需的全部参数。
#[derive(Clone)]
pub struct ClientSettings {
    pub endpoint_url: String,
    pub update_endpoint_url: Option<String>,
    pub security_policy: SecurityPolicy,
    pub identity: Identity,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub keep_alive_failures_allowed: u32,
    pub application_name: String,
    pub application_uri: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl ClientSettings {
    pub fn from_config(config: &ConnectorConfig, security: &SecurityContext) -> Self {
        Self {
            endpoint_url: config.endpoint_url.clone(),
            update_endpoint_url: config.update_endpoint_url.clone(),
            security_policy: config.security_policy,
            identity: config.identity.clone(),
            request_timeout: config.request_timeout,
            connect_timeout: config.connect_timeout,
            keep_alive_failures_allowed: config.keep_alive_failures_allowed,
            application_name: format!("Automation Gateway {}", config.id),
            application_uri: security.application_uri().to_string(),
            certificate_pem: security.certificate().pem().to_string(),
            private_key_pem: security.key_pair().private_key_pem().to_string(),
        }
    }
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("endpoint_url", &self.endpoint_url)
            .field("update_endpoint_url", &self.update_endpoint_url)
            .field("security_policy", &self.security_policy)
            .field("identity", &self.identity)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("application_uri", &self.application_uri)
            .finish_non_exhaustive()
    }
}

/// 服务器公布的端点。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    pub endpoint_url: String,
    pub security_policy_uri: String,
}

/// 选出第一个满足安全策略的端点，并按 `update_endpoint_url` 改写地址。
pub fn select_endpoint(
    endpoints: &[EndpointDescription],
    settings: &ClientSettings,
) -> Option<EndpointDescription> {
    let endpoint = endpoints
        .iter()
        .find(|e| settings.security_policy.accepts(&e.security_policy_uri))?;
    let mut selected = endpoint.clone();
    if let Some(update) = &settings.update_endpoint_url {
        selected.endpoint_url = rewrite_endpoint_url(&endpoint.endpoint_url, update);
    }
    Some(selected)
}

/// 完整 URL 直接替换；仅主机名时保留原端口与路径。
pub fn rewrite_endpoint_url(original: &str, update: &str) -> String {
    if update.contains("://") {
        return update.to_string();
    }
    let Some((scheme, rest)) = original.split_once("://") else {
        return update.to_string();
    };
    let host_end = rest.find([':', '/']).unwrap_or(rest.len());
    format!("{scheme}://{update}{}", &rest[host_end..])
}

/// 监控项创建请求。
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemRequest {
    pub node_id: String,
    pub client_handle: u32,
    pub sampling_interval: f64,
    pub queue_size: u32,
    pub discard_oldest: bool,
    pub trigger: DataChangeTrigger,
}

/// 监控项创建结果，`status` 非 good 时该项未创建。
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItemResult {
    pub client_handle: u32,
    pub node_id: String,
    pub item_id: MonitoredItemId,
    pub status: StatusCode,
}

/// 会话事件。
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 服务调用故障通知
    ServiceFault { status: StatusCode, message: String },
    ConnectionLost,
    ConnectionRestored,
    KeepAlive { subscription: SubscriptionId },
    StatusChanged {
        subscription: SubscriptionId,
        status: StatusCode,
    },
    NotificationDataLost { subscription: SubscriptionId },
    /// 服务器端订阅转移失败，订阅需整体重建
    TransferFailed {
        subscription: SubscriptionId,
        status: StatusCode,
    },
    DataChange {
        subscription: SubscriptionId,
        client_handle: u32,
        value: Value,
    },
}

/// 一次活动连接。
#[async_trait]
pub trait Session: Send + Sync {
    /// 会话事件流；每次调用返回新的接收端。
    fn events(&self) -> broadcast::Receiver<SessionEvent>;

    async fn create_subscription(
        &self,
        publishing_interval: f64,
    ) -> Result<SubscriptionId, ClientError>;

    async fn create_monitored_items(
        &self,
        subscription: SubscriptionId,
        requests: Vec<MonitoredItemRequest>,
    ) -> Result<Vec<MonitoredItemResult>, ClientError>;

    async fn delete_monitored_items(
        &self,
        subscription: SubscriptionId,
        items: Vec<MonitoredItemId>,
    ) -> Result<(), ClientError>;

    /// 结果与 `node_ids` 一一对应，未知节点返回错误状态的值。
    async fn read(&self, node_ids: &[String]) -> Result<Vec<Value>, ClientError>;

    async fn write(&self, node_id: &str, value: Variant) -> Result<StatusCode, ClientError>;

    /// 节点声明的数据类型。
    async fn data_type(&self, node_id: &str) -> Result<BuiltinType, ClientError>;

    async fn browse(&self, node_id: &str) -> Result<Vec<BrowseEntry>, ClientError>;

    async fn server_info(&self) -> Result<ServerInfo, ClientError>;

    async fn disconnect(&self) -> Result<(), ClientError>;
}

/// 会话工厂。
#[async_trait]
pub trait ClientConnector: Send + Sync {
    async fn connect(&self, settings: &ClientSettings) -> Result<Arc<dyn Session>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_update_keeps_port_and_path() {
        assert_eq!(
            rewrite_endpoint_url("opc.tcp://internal:4840/ua", "plc.example.com"),
            "opc.tcp://plc.example.com:4840/ua"
        );
        assert_eq!(
            rewrite_endpoint_url("opc.tcp://internal", "10.0.0.5"),
            "opc.tcp://10.0.0.5"
        );
    }

    #[test]
    fn full_url_update_replaces_endpoint() {
        assert_eq!(
            rewrite_endpoint_url("opc.tcp://internal:4840", "opc.tcp://10.0.0.5:4841"),
            "opc.tcp://10.0.0.5:4841"
        );
    }
}
