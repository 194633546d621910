//! 协议处理契约
//!
//! connector 负责生命周期与分发，具体协议通过 [`ProtocolHandler`] 实现 7 个总线操作。
//! 每次调用都在 connector 的分发上下文中串行执行，可以独占访问订阅状态。
//! 处理器不会被中途取消：`ctx.session` 的每次服务调用以 `RequestTimeout` 为上限，
//! 超时以 [`ClientError::Timeout`](crate::ClientError) 返回，错误路径自行回滚。

use crate::client::Session;
use crate::subscription::{SubscriptionHandle, TopicRegistry};
use api_contract::{
    BrowseRequest, BusFault, BusReply, BusRequest, PublishRequest, ReadRequest, ServerInfoRequest,
    SubscribeRequest, UnsubscribeRequest, WriteRequest,
};
use async_trait::async_trait;
use domain::{SourceType, StatusCode};
use gw_config::MonitoringParameters;
use std::sync::Arc;
use tracing::debug;

/// 处理器可见的 connector 状态。
pub struct HandlerContext<'a> {
    pub connector_id: &'a str,
    pub session: &'a Arc<dyn Session>,
    pub subscription: &'a mut SubscriptionHandle,
    pub topics: &'a mut TopicRegistry,
    pub monitoring: &'a MonitoringParameters,
}

pub type HandlerResult = Result<BusReply, BusFault>;

#[async_trait]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Topic 名称的来源前缀。
    fn source_type(&self) -> SourceType;

    async fn server_info(
        &self,
        ctx: &mut HandlerContext<'_>,
        request: ServerInfoRequest,
    ) -> HandlerResult;

    async fn subscribe(&self, ctx: &mut HandlerContext<'_>, request: SubscribeRequest)
    -> HandlerResult;

    async fn unsubscribe(
        &self,
        ctx: &mut HandlerContext<'_>,
        request: UnsubscribeRequest,
    ) -> HandlerResult;

    async fn publish(&self, ctx: &mut HandlerContext<'_>, request: PublishRequest) -> HandlerResult;

    async fn read(&self, ctx: &mut HandlerContext<'_>, request: ReadRequest) -> HandlerResult;

    async fn write(&self, ctx: &mut HandlerContext<'_>, request: WriteRequest) -> HandlerResult;

    async fn browse(&self, ctx: &mut HandlerContext<'_>, request: BrowseRequest) -> HandlerResult;

    /// 订阅（重新）创建后调用，把已知 Topic 重新注册到新订阅上。
    async fn resubscribe(&self, ctx: &mut HandlerContext<'_>);

    /// 连接层的服务故障通知，默认只记录。
    fn on_service_fault(&self, connector_id: &str, status: StatusCode, message: &str) {
        debug!(
            target: "gw.connector",
            connector_id = %connector_id,
            status = %status,
            message = %message,
            "service_fault_observed"
        );
    }

    /// 按请求类型分发。
    async fn handle(&self, ctx: &mut HandlerContext<'_>, request: BusRequest) -> HandlerResult {
        match request {
            BusRequest::ServerInfo(r) => self.server_info(ctx, r).await,
            BusRequest::Subscribe(r) => self.subscribe(ctx, r).await,
            BusRequest::Unsubscribe(r) => self.unsubscribe(ctx, r).await,
            BusRequest::Publish(r) => self.publish(ctx, r).await,
            BusRequest::Read(r) => self.read(ctx, r).await,
            BusRequest::Write(r) => self.write(ctx, r).await,
            BusRequest::Browse(r) => self.browse(ctx, r).await,
        }
    }
}
