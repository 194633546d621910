//! OPC 风格协议处理器
//!
//! - Subscribe：按客户端引用计数，第一个客户端到达时才在服务器端创建监控项
//! - Unsubscribe：最后一个客户端离开时删除监控项
//! - Path Topic 从 Objects 文件夹开始按浏览名称解析，`+` 匹配一层，`#` 匹配任意层

use crate::client::MonitoredItemRequest;
use crate::error::ClientError;
use crate::handler::{HandlerContext, HandlerResult, ProtocolHandler};
use api_contract::{
    BrowseRequest, BusFault, BusReply, NodeClass, PublishPayload, PublishRequest, ReadRequest,
    ServerInfoRequest, SubscribeRequest, UnsubscribeRequest, WriteRequest,
};
use async_trait::async_trait;
use domain::{SourceType, Topic, TopicType, Variant};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Objects 文件夹。
pub const OBJECTS_FOLDER: &str = "i=85";

/// Path 解析时对象节点的最大递归深度。
const MAX_BROWSE_DEPTH: usize = 32;

#[derive(Debug, Default, Clone, Copy)]
pub struct OpcUaHandler;

impl OpcUaHandler {
    pub fn new() -> Self {
        Self
    }
}

fn client_fault(err: ClientError) -> BusFault {
    BusFault::failed(err.to_string())
}

fn check_topic(topic: &Topic) -> Result<(), BusFault> {
    if topic.source_type() != SourceType::Opc || !topic.is_valid() {
        return Err(BusFault::invalid_request(format!("invalid topic: {topic}")));
    }
    Ok(())
}

/// 浏览路径分段，`$objects` 映射到 Objects 文件夹。
fn path_items(topic: &Topic) -> Vec<String> {
    topic
        .browse_path()
        .into_iter()
        .map(|item| {
            if item.eq_ignore_ascii_case("$objects") {
                OBJECTS_FOLDER.to_string()
            } else {
                item
            }
        })
        .collect()
}

/// 把 Path Topic 解析为变量节点 ID（保持发现顺序，去重）。
async fn resolve_path(
    ctx: &HandlerContext<'_>,
    topic: &Topic,
) -> Result<Vec<String>, ClientError> {
    let items = path_items(topic);
    if items.len() < 2 {
        warn!(
            target: "gw.connector",
            connector_id = %ctx.connector_id,
            topic = %topic,
            "path_too_short"
        );
        return Ok(Vec::new());
    }

    let mut resolved = Vec::new();
    let mut seen = HashSet::new();
    let mut pending = vec![(items[0].clone(), 1usize, 0usize)];
    while let Some((node, index, depth)) = pending.pop() {
        let item = items[index].as_str();
        let next = if item != "#" && index + 1 < items.len() {
            index + 1
        } else {
            index
        };
        let children = ctx.session.browse(&node).await?;
        let mut objects = Vec::new();
        for child in children
            .into_iter()
            .filter(|c| item == "#" || item == "+" || c.browse_name == item)
        {
            match child.node_class {
                NodeClass::Variable => {
                    if seen.insert(child.node_id.clone()) {
                        resolved.push(child.node_id);
                    }
                }
                NodeClass::Object if depth < MAX_BROWSE_DEPTH => {
                    objects.push((child.node_id, next, depth + 1));
                }
                _ => {}
            }
        }
        pending.extend(objects.into_iter().rev());
    }
    info!(
        target: "gw.connector",
        connector_id = %ctx.connector_id,
        topic = %topic,
        resolved = resolved.len(),
        "path_resolved"
    );
    Ok(resolved)
}

/// 为 `(node_id, 载荷 Topic)` 创建监控项，返回成功创建的数量。
async fn monitor_nodes(
    ctx: &mut HandlerContext<'_>,
    topic: &Topic,
    nodes: Vec<(String, Topic)>,
) -> Result<usize, ClientError> {
    let mut value_topics = HashMap::new();
    let mut requests = Vec::with_capacity(nodes.len());
    for (node_id, value_topic) in nodes {
        let client_handle = ctx.subscription.next_client_handle();
        value_topics.insert(client_handle, value_topic);
        requests.push(MonitoredItemRequest {
            node_id,
            client_handle,
            sampling_interval: ctx.monitoring.sampling_interval,
            queue_size: ctx.monitoring.buffer_size,
            discard_oldest: ctx.monitoring.discard_oldest,
            trigger: ctx.monitoring.data_change_trigger,
        });
    }

    let results = ctx
        .session
        .create_monitored_items(ctx.subscription.id(), requests)
        .await?;
    let mut created = 0;
    for result in &results {
        let Some(value_topic) = value_topics.remove(&result.client_handle) else {
            continue;
        };
        if ctx.subscription.add_monitored_item(topic, value_topic, result) {
            created += 1;
        } else {
            warn!(
                target: "gw.connector",
                connector_id = %ctx.connector_id,
                node_id = %result.node_id,
                status = %result.status,
                "monitored_item_failed"
            );
        }
    }
    debug!(
        target: "gw.connector",
        connector_id = %ctx.connector_id,
        topic = %topic,
        created,
        "monitored_items_created"
    );
    Ok(created)
}

/// 在当前订阅上为 Topic 创建监控项。
async fn monitor_topic(ctx: &mut HandlerContext<'_>, topic: &Topic) -> Result<bool, ClientError> {
    let nodes = match topic.topic_type() {
        TopicType::Node => vec![(topic.address().to_string(), topic.clone())],
        TopicType::Path => resolve_path(ctx, topic)
            .await?
            .into_iter()
            .map(|node_id| {
                let value_topic = topic.node_topic(&node_id);
                (node_id, value_topic)
            })
            .collect(),
        TopicType::Unknown => Vec::new(),
    };
    if nodes.is_empty() {
        return Ok(false);
    }
    Ok(monitor_nodes(ctx, topic, nodes).await? > 0)
}

/// 文本按节点数据类型转换，空文本写入 Null。
async fn text_to_variant(
    ctx: &HandlerContext<'_>,
    node_id: &str,
    text: &str,
) -> Result<Variant, BusFault> {
    if text.is_empty() {
        return Ok(Variant::Null);
    }
    let data_type = ctx.session.data_type(node_id).await.map_err(client_fault)?;
    Variant::from_text(data_type, text).map_err(|err| BusFault::invalid_request(err.to_string()))
}

#[async_trait]
impl ProtocolHandler for OpcUaHandler {
    fn source_type(&self) -> SourceType {
        SourceType::Opc
    }

    async fn server_info(
        &self,
        ctx: &mut HandlerContext<'_>,
        _request: ServerInfoRequest,
    ) -> HandlerResult {
        let info = ctx.session.server_info().await.map_err(client_fault)?;
        Ok(BusReply::ServerInfo(info))
    }

    async fn subscribe(
        &self,
        ctx: &mut HandlerContext<'_>,
        request: SubscribeRequest,
    ) -> HandlerResult {
        check_topic(&request.topic)?;
        let topic = request.topic;
        let (count, added) = ctx.topics.add_client(&topic, &request.client_id);
        if !added {
            warn!(
                target: "gw.connector",
                connector_id = %ctx.connector_id,
                client_id = %request.client_id,
                topic = %topic,
                "client_already_subscribed"
            );
            return Ok(BusReply::Subscribe { ok: false });
        }
        if count > 1 {
            return Ok(BusReply::Subscribe { ok: true });
        }

        match monitor_topic(ctx, &topic).await {
            Ok(true) => Ok(BusReply::Subscribe { ok: true }),
            Ok(false) => {
                ctx.topics.remove_client(&topic, &request.client_id);
                Ok(BusReply::Subscribe { ok: false })
            }
            Err(err) => {
                ctx.topics.remove_client(&topic, &request.client_id);
                Err(client_fault(err))
            }
        }
    }

    async fn unsubscribe(
        &self,
        ctx: &mut HandlerContext<'_>,
        request: UnsubscribeRequest,
    ) -> HandlerResult {
        let mut items = Vec::new();
        for topic in &request.topics {
            let (count, removed) = ctx.topics.remove_client(topic, &request.client_id);
            if !removed {
                warn!(
                    target: "gw.connector",
                    connector_id = %ctx.connector_id,
                    client_id = %request.client_id,
                    topic = %topic,
                    "client_not_subscribed"
                );
            } else if count == 0 {
                items.extend(ctx.subscription.remove_topic(topic));
            }
        }
        if !items.is_empty() {
            ctx.session
                .delete_monitored_items(ctx.subscription.id(), items)
                .await
                .map_err(client_fault)?;
        }
        Ok(BusReply::Unsubscribe { ok: true })
    }

    async fn publish(&self, ctx: &mut HandlerContext<'_>, request: PublishRequest) -> HandlerResult {
        check_topic(&request.topic)?;
        if request.topic.topic_type() != TopicType::Node {
            return Err(BusFault::not_supported(format!(
                "publish to {:?} topics",
                request.topic.topic_type()
            )));
        }
        let node_id = request.topic.address();
        let variant = match request.payload {
            PublishPayload::Value(value) => value.variant,
            PublishPayload::Text(text) => match text_to_variant(ctx, node_id, &text).await {
                Ok(variant) => variant,
                Err(fault) => {
                    warn!(
                        target: "gw.connector",
                        connector_id = %ctx.connector_id,
                        node_id = %node_id,
                        error = %fault,
                        "publish_value_invalid"
                    );
                    return Ok(BusReply::Publish { ok: false });
                }
            },
        };
        let status = ctx
            .session
            .write(node_id, variant)
            .await
            .map_err(client_fault)?;
        Ok(BusReply::Publish {
            ok: status.is_good(),
        })
    }

    async fn read(&self, ctx: &mut HandlerContext<'_>, request: ReadRequest) -> HandlerResult {
        if request.node_ids.is_empty() {
            return Err(BusFault::invalid_request("read request without node ids"));
        }
        let values = ctx
            .session
            .read(&request.node_ids)
            .await
            .map_err(client_fault)?;
        Ok(BusReply::Read(values))
    }

    async fn write(&self, ctx: &mut HandlerContext<'_>, request: WriteRequest) -> HandlerResult {
        if request.items.is_empty() {
            return Err(BusFault::invalid_request("write request without items"));
        }
        let mut results = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let written = match text_to_variant(ctx, &item.node_id, &item.value).await {
                Ok(variant) => match ctx.session.write(&item.node_id, variant).await {
                    Ok(status) => status.is_good(),
                    Err(err) => {
                        warn!(
                            target: "gw.connector",
                            connector_id = %ctx.connector_id,
                            node_id = %item.node_id,
                            error = %err,
                            "write_failed"
                        );
                        false
                    }
                },
                Err(fault) => {
                    warn!(
                        target: "gw.connector",
                        connector_id = %ctx.connector_id,
                        node_id = %item.node_id,
                        error = %fault,
                        "write_value_invalid"
                    );
                    false
                }
            };
            results.push(written);
        }
        Ok(BusReply::Write(results))
    }

    async fn browse(&self, ctx: &mut HandlerContext<'_>, request: BrowseRequest) -> HandlerResult {
        let node_id = if request.node_id.is_empty() {
            OBJECTS_FOLDER
        } else {
            request.node_id.as_str()
        };
        let entries = ctx.session.browse(node_id).await.map_err(client_fault)?;
        Ok(BusReply::Browse(entries))
    }

    async fn resubscribe(&self, ctx: &mut HandlerContext<'_>) {
        let topics = ctx.topics.topics();
        if topics.is_empty() {
            return;
        }
        info!(
            target: "gw.connector",
            connector_id = %ctx.connector_id,
            topics = topics.len(),
            "resubscribe"
        );
        for topic in topics {
            ctx.subscription.remove_topic(&topic);
            match monitor_topic(ctx, &topic).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    target: "gw.connector",
                    connector_id = %ctx.connector_id,
                    topic = %topic,
                    "resubscribe_topic_empty"
                ),
                Err(err) => warn!(
                    target: "gw.connector",
                    connector_id = %ctx.connector_id,
                    topic = %topic,
                    error = %err,
                    "resubscribe_topic_failed"
                ),
            }
        }
    }
}
