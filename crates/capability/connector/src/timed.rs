//! 带请求超时的会话
//!
//! 分发上下文里的每次服务调用都以 `RequestTimeout` 为上限，处理器本身不会被中途丢弃。
//! 超时的监控项创建在后台等待完成，迟到的监控项随即删除。

use crate::client::{
    MonitoredItemId, MonitoredItemRequest, MonitoredItemResult, Session, SessionEvent,
    SubscriptionId,
};
use crate::error::ClientError;
use api_contract::{BrowseEntry, ServerInfo};
use async_trait::async_trait;
use domain::{BuiltinType, StatusCode, Value, Variant};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{Instrument, info, warn};

pub struct TimedSession {
    inner: Arc<dyn Session>,
    timeout: Duration,
}

impl TimedSession {
    pub fn new(inner: Arc<dyn Session>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    fn elapsed(&self, service: &str) -> ClientError {
        ClientError::Timeout(format!(
            "{service} timed out after {}ms",
            self.timeout.as_millis()
        ))
    }

    async fn bounded<T>(
        &self,
        service: &str,
        call: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or_else(|_| Err(self.elapsed(service)))
    }
}

#[async_trait]
impl Session for TimedSession {
    fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events()
    }

    /// 在 worker 任务中执行，不设上限。
    async fn create_subscription(
        &self,
        publishing_interval: f64,
    ) -> Result<SubscriptionId, ClientError> {
        self.inner.create_subscription(publishing_interval).await
    }

    async fn create_monitored_items(
        &self,
        subscription: SubscriptionId,
        requests: Vec<MonitoredItemRequest>,
    ) -> Result<Vec<MonitoredItemResult>, ClientError> {
        let inner = self.inner.clone();
        let mut call = tokio::spawn(
            async move { inner.create_monitored_items(subscription, requests).await }
                .in_current_span(),
        );
        match tokio::time::timeout(self.timeout, &mut call).await {
            Ok(joined) => {
                joined.map_err(|err| ClientError::Service(StatusCode::BAD, err.to_string()))?
            }
            Err(_) => {
                let inner = self.inner.clone();
                tokio::spawn(
                    async move {
                        let Ok(Ok(results)) = call.await else {
                            return;
                        };
                        let items: Vec<MonitoredItemId> = results
                            .iter()
                            .filter(|r| r.status.is_good())
                            .map(|r| r.item_id)
                            .collect();
                        if items.is_empty() {
                            return;
                        }
                        let count = items.len();
                        match inner.delete_monitored_items(subscription, items).await {
                            Ok(()) => info!(
                                target: "gw.connector",
                                subscription,
                                count,
                                "late_monitored_items_deleted"
                            ),
                            Err(err) => warn!(
                                target: "gw.connector",
                                subscription,
                                count,
                                error = %err,
                                "late_monitored_items_delete_failed"
                            ),
                        }
                    }
                    .in_current_span(),
                );
                Err(self.elapsed("CreateMonitoredItems"))
            }
        }
    }

    async fn delete_monitored_items(
        &self,
        subscription: SubscriptionId,
        items: Vec<MonitoredItemId>,
    ) -> Result<(), ClientError> {
        self.bounded(
            "DeleteMonitoredItems",
            self.inner.delete_monitored_items(subscription, items),
        )
        .await
    }

    async fn read(&self, node_ids: &[String]) -> Result<Vec<Value>, ClientError> {
        self.bounded("Read", self.inner.read(node_ids)).await
    }

    async fn write(&self, node_id: &str, value: Variant) -> Result<StatusCode, ClientError> {
        self.bounded("Write", self.inner.write(node_id, value)).await
    }

    async fn data_type(&self, node_id: &str) -> Result<BuiltinType, ClientError> {
        self.bounded("ReadDataType", self.inner.data_type(node_id)).await
    }

    async fn browse(&self, node_id: &str) -> Result<Vec<BrowseEntry>, ClientError> {
        self.bounded("Browse", self.inner.browse(node_id)).await
    }

    async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        self.bounded("ServerInfo", self.inner.server_info()).await
    }

    /// 停止流程等待断开完成，不设上限。
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.disconnect().await
    }
}
