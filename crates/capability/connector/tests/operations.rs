mod support;

use api_contract::{
    BrowseRequest, BusReply, BusRequest, FaultCode, NodeClass, PublishPayload, PublishRequest,
    ReadRequest, ServerInfoRequest, SubscribeRequest, UnsubscribeRequest, WriteItem, WriteRequest,
};
use api_contract::{BrowseEntry, ServerInfo};
use async_trait::async_trait;
use domain::{BuiltinType, StatusCode, Topic, Value, Variant};
use gw_connector::client::{MonitoredItemId, SubscriptionId};
use gw_connector::{
    ClientConnector, ClientError, ClientSettings, ConnectorHandle, ConnectorState,
    MonitoredItemRequest, MonitoredItemResult, Session, SessionEvent, SimulatedClient,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use support::{Harness, config, dev_config, reach, settle};
use tokio::sync::broadcast;

const COUNTER: &str = "Opc/dev1/Node/ns=2;s=Demo/Counter";

async fn running() -> (Harness, ConnectorHandle) {
    let harness = Harness::demo();
    let handle = harness.start(dev_config("dev1"));
    reach(&handle, ConnectorState::Subscribed).await;
    settle().await;
    (harness, handle)
}

fn subscribe(client: &str, topic: &str) -> BusRequest {
    BusRequest::Subscribe(SubscribeRequest {
        id: format!("sub-{client}"),
        client_id: client.to_string(),
        topic: Topic::parse(topic),
    })
}

fn unsubscribe(client: &str, topics: &[&str]) -> BusRequest {
    BusRequest::Unsubscribe(UnsubscribeRequest {
        id: format!("unsub-{client}"),
        client_id: client.to_string(),
        topics: topics.iter().map(|t| Topic::parse(t)).collect(),
    })
}

fn publish(topic: &str, payload: PublishPayload) -> BusRequest {
    BusRequest::Publish(PublishRequest {
        id: "pub-1".to_string(),
        topic: Topic::parse(topic),
        payload,
    })
}

#[tokio::test(start_paused = true)]
async fn subscribe_publishes_initial_and_changed_values() {
    let (harness, handle) = running().await;
    let mut values = harness.bus.subscribe_values(COUNTER).unwrap();

    let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", COUNTER)).await;
    assert_eq!(response.id, "sub-c1");
    assert_eq!(response.result, Ok(BusReply::Subscribe { ok: true }));

    let initial = values.next().await.unwrap();
    assert_eq!(initial.topic.name(), COUNTER);
    assert_eq!(initial.value.variant, Variant::Int32(0));

    harness
        .server
        .update_value("ns=2;s=Demo/Counter", Variant::Int32(5));
    let changed = tokio::time::timeout(Duration::from_secs(1), values.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(changed.value.variant, Variant::Int32(5));
    assert!(changed.value.status.is_good());
    assert!(handle.stats().values_published >= 2);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn topic_reference_counting_across_clients() {
    let (harness, handle) = running().await;

    let first = harness.request("Opc/dev1/Subscribe", subscribe("c1", COUNTER)).await;
    assert_eq!(first.result, Ok(BusReply::Subscribe { ok: true }));
    let again = harness.request("Opc/dev1/Subscribe", subscribe("c1", COUNTER)).await;
    assert_eq!(again.result, Ok(BusReply::Subscribe { ok: false }));
    let second = harness.request("Opc/dev1/Subscribe", subscribe("c2", COUNTER)).await;
    assert_eq!(second.result, Ok(BusReply::Subscribe { ok: true }));
    assert_eq!(harness.server.live_monitored_items(), 1);

    let response = harness
        .request("Opc/dev1/Unsubscribe", unsubscribe("c1", &[COUNTER]))
        .await;
    assert_eq!(response.result, Ok(BusReply::Unsubscribe { ok: true }));
    assert_eq!(harness.server.live_monitored_items(), 1);

    harness
        .request("Opc/dev1/Unsubscribe", unsubscribe("c2", &[COUNTER]))
        .await;
    assert_eq!(harness.server.live_monitored_items(), 0);

    // 未订阅的客户端退订不报错
    let response = harness
        .request("Opc/dev1/Unsubscribe", unsubscribe("c3", &[COUNTER]))
        .await;
    assert_eq!(response.result, Ok(BusReply::Unsubscribe { ok: true }));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn path_wildcards_expand_to_variables() {
    let (harness, handle) = running().await;

    let all = "Opc/dev1/Path/$objects/#";
    let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", all)).await;
    assert_eq!(response.result, Ok(BusReply::Subscribe { ok: true }));
    assert_eq!(harness.server.live_monitored_items(), 4);

    let level = "Opc/dev1/Path:Value/$objects/Demo/+";
    let mut values = harness.bus.subscribe_values(level).unwrap();
    let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", level)).await;
    assert_eq!(response.result, Ok(BusReply::Subscribe { ok: true }));
    assert_eq!(harness.server.live_monitored_items(), 8);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let notification = values.next().await.unwrap();
        assert_eq!(notification.topic.source_type(), domain::SourceType::Opc);
        seen.push(notification.topic.name());
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            "Opc/dev1/Node:Value/ns=2;s=Demo/Counter",
            "Opc/dev1/Node:Value/ns=2;s=Demo/Name",
            "Opc/dev1/Node:Value/ns=2;s=Demo/Switch",
            "Opc/dev1/Node:Value/ns=2;s=Demo/Temperature",
        ]
    );

    let single = "Opc/dev1/Path/$objects/Demo/Switch";
    harness.request("Opc/dev1/Subscribe", subscribe("c1", single)).await;
    assert_eq!(harness.server.live_monitored_items(), 9);

    harness
        .request("Opc/dev1/Unsubscribe", unsubscribe("c1", &[all, level, single]))
        .await;
    assert_eq!(harness.server.live_monitored_items(), 0);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unresolvable_subscription_is_rolled_back() {
    let (harness, handle) = running().await;

    let missing = "Opc/dev1/Path/$objects/Missing/+";
    let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", missing)).await;
    assert_eq!(response.result, Ok(BusReply::Subscribe { ok: false }));

    let unknown = "Opc/dev1/Node/ns=2;s=Nope";
    let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", unknown)).await;
    assert_eq!(response.result, Ok(BusReply::Subscribe { ok: false }));

    // 回滚后同一客户端可再次订阅
    harness
        .server
        .add_variable("ns=2;s=Demo", "ns=2;s=Nope", "Nope", Variant::Int32(1));
    let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", unknown)).await;
    assert_eq!(response.result, Ok(BusReply::Subscribe { ok: true }));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn subscribe_rejects_foreign_topics() {
    let (harness, handle) = running().await;

    for topic in ["Mqtt/broker/Node/a/b", "Opc/dev1", "plain"] {
        let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", topic)).await;
        let fault = response.result.unwrap_err();
        assert_eq!(fault.code, FaultCode::InvalidRequest, "{topic}");
    }
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn read_write_and_browse() {
    let (harness, handle) = running().await;

    let response = harness
        .request(
            "Opc/dev1/Read",
            BusRequest::Read(ReadRequest {
                id: "r-1".to_string(),
                node_ids: vec![
                    "ns=2;s=Demo/Temperature".to_string(),
                    "ns=2;s=Demo/Missing".to_string(),
                ],
            }),
        )
        .await;
    let Ok(BusReply::Read(values)) = response.result else {
        panic!("unexpected read reply: {:?}", response.result);
    };
    assert_eq!(values[0].variant, Variant::Double(21.5));
    assert_eq!(values[1].status, StatusCode::BAD_NODE_ID_UNKNOWN);

    let response = harness
        .request(
            "Opc/dev1/Write",
            BusRequest::Write(WriteRequest {
                id: "w-1".to_string(),
                items: vec![
                    WriteItem {
                        node_id: "ns=2;s=Demo/Counter".to_string(),
                        value: "42".to_string(),
                    },
                    WriteItem {
                        node_id: "ns=2;s=Demo/Switch".to_string(),
                        value: "maybe".to_string(),
                    },
                    WriteItem {
                        node_id: "ns=2;s=Demo/Missing".to_string(),
                        value: "1".to_string(),
                    },
                ],
            }),
        )
        .await;
    assert_eq!(response.result, Ok(BusReply::Write(vec![true, false, false])));
    assert_eq!(
        harness.server.value("ns=2;s=Demo/Counter").unwrap().variant,
        Variant::Int32(42)
    );

    let response = harness
        .request(
            "Opc/dev1/Browse",
            BusRequest::Browse(BrowseRequest {
                id: "b-1".to_string(),
                node_id: String::new(),
            }),
        )
        .await;
    let Ok(BusReply::Browse(entries)) = response.result else {
        panic!("unexpected browse reply: {:?}", response.result);
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].browse_name, "Demo");
    assert_eq!(entries[0].node_class, NodeClass::Object);

    let response = harness
        .request(
            "Opc/dev1/Browse",
            BusRequest::Browse(BrowseRequest {
                id: "b-2".to_string(),
                node_id: entries[0].node_id.clone(),
            }),
        )
        .await;
    let Ok(BusReply::Browse(children)) = response.result else {
        panic!("unexpected browse reply: {:?}", response.result);
    };
    assert_eq!(children.len(), 4);
    assert!(children.iter().all(|c| c.node_class == NodeClass::Variable));

    let response = harness
        .request(
            "Opc/dev1/Browse",
            BusRequest::Browse(BrowseRequest {
                id: "b-3".to_string(),
                node_id: "ns=9;s=Nowhere".to_string(),
            }),
        )
        .await;
    assert_eq!(response.result.unwrap_err().code, FaultCode::Failed);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn empty_requests_are_invalid() {
    let (harness, handle) = running().await;

    let response = harness
        .request(
            "Opc/dev1/Read",
            BusRequest::Read(ReadRequest {
                id: "r-1".to_string(),
                node_ids: Vec::new(),
            }),
        )
        .await;
    assert_eq!(response.result.unwrap_err().code, FaultCode::InvalidRequest);

    let response = harness
        .request(
            "Opc/dev1/Write",
            BusRequest::Write(WriteRequest {
                id: "w-1".to_string(),
                items: Vec::new(),
            }),
        )
        .await;
    assert_eq!(response.result.unwrap_err().code, FaultCode::InvalidRequest);

    // 请求类型与地址不符
    let response = harness
        .request(
            "Opc/dev1/Write",
            BusRequest::ServerInfo(ServerInfoRequest {
                id: "s-1".to_string(),
            }),
        )
        .await;
    assert_eq!(response.result.unwrap_err().code, FaultCode::InvalidRequest);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn publish_writes_typed_and_text_values() {
    let (harness, handle) = running().await;

    let response = harness
        .request(
            "Opc/dev1/Publish",
            publish(COUNTER, PublishPayload::Value(Value::good(Variant::Int32(7)))),
        )
        .await;
    assert_eq!(response.result, Ok(BusReply::Publish { ok: true }));
    assert_eq!(
        harness.server.value("ns=2;s=Demo/Counter").unwrap().variant,
        Variant::Int32(7)
    );

    let response = harness
        .request(
            "Opc/dev1/Publish",
            publish(COUNTER, PublishPayload::Value(Value::good(Variant::Double(1.5)))),
        )
        .await;
    assert_eq!(response.result, Ok(BusReply::Publish { ok: false }));

    let response = harness
        .request(
            "Opc/dev1/Publish",
            publish(
                "Opc/dev1/Node/ns=2;s=Demo/Switch",
                PublishPayload::Text("true".to_string()),
            ),
        )
        .await;
    assert_eq!(response.result, Ok(BusReply::Publish { ok: true }));
    assert_eq!(
        harness.server.value("ns=2;s=Demo/Switch").unwrap().variant,
        Variant::Boolean(true)
    );

    let response = harness
        .request(
            "Opc/dev1/Publish",
            publish(COUNTER, PublishPayload::Text("not a number".to_string())),
        )
        .await;
    assert_eq!(response.result, Ok(BusReply::Publish { ok: false }));

    let response = harness
        .request(
            "Opc/dev1/Publish",
            publish(
                "Opc/dev1/Path/$objects/Demo/+",
                PublishPayload::Text("1".to_string()),
            ),
        )
        .await;
    assert_eq!(response.result.unwrap_err().code, FaultCode::NotSupported);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn server_info_reports_upstream_details() {
    let (harness, handle) = running().await;

    let response = harness
        .request(
            "Opc/dev1/ServerInfo",
            BusRequest::ServerInfo(ServerInfoRequest {
                id: "s-1".to_string(),
            }),
        )
        .await;
    let Ok(BusReply::ServerInfo(info)) = response.result else {
        panic!("unexpected server info reply: {:?}", response.result);
    };
    assert_eq!(info.product_name, "Simulated Server");
    assert_eq!(info.namespaces.len(), 2);
    assert!(info.current_time_ms >= info.start_time_ms);
    assert_eq!(handle.stats().requests_dispatched, 1);
    handle.stop().await.unwrap();
}

/// 监控项在服务器端创建完成后，应答延迟到达。
struct LaggingClient {
    inner: SimulatedClient,
    lagging: Arc<AtomicBool>,
}

struct LaggingSession {
    inner: Arc<dyn Session>,
    lagging: Arc<AtomicBool>,
}

#[async_trait]
impl ClientConnector for LaggingClient {
    async fn connect(&self, settings: &ClientSettings) -> Result<Arc<dyn Session>, ClientError> {
        let inner = self.inner.connect(settings).await?;
        Ok(Arc::new(LaggingSession {
            inner,
            lagging: self.lagging.clone(),
        }))
    }
}

#[async_trait]
impl Session for LaggingSession {
    fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events()
    }

    async fn create_subscription(&self, interval: f64) -> Result<SubscriptionId, ClientError> {
        self.inner.create_subscription(interval).await
    }

    async fn create_monitored_items(
        &self,
        subscription: SubscriptionId,
        requests: Vec<MonitoredItemRequest>,
    ) -> Result<Vec<MonitoredItemResult>, ClientError> {
        let results = self.inner.create_monitored_items(subscription, requests).await;
        if self.lagging.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(3000)).await;
        }
        results
    }

    async fn delete_monitored_items(
        &self,
        subscription: SubscriptionId,
        items: Vec<MonitoredItemId>,
    ) -> Result<(), ClientError> {
        self.inner.delete_monitored_items(subscription, items).await
    }

    async fn read(&self, node_ids: &[String]) -> Result<Vec<Value>, ClientError> {
        self.inner.read(node_ids).await
    }

    async fn write(&self, node_id: &str, value: Variant) -> Result<StatusCode, ClientError> {
        self.inner.write(node_id, value).await
    }

    async fn data_type(&self, node_id: &str) -> Result<BuiltinType, ClientError> {
        self.inner.data_type(node_id).await
    }

    async fn browse(&self, node_id: &str) -> Result<Vec<BrowseEntry>, ClientError> {
        self.inner.browse(node_id).await
    }

    async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        self.inner.server_info().await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.disconnect().await
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_subscribe_rolls_back_and_deletes_late_items() {
    let mut harness = Harness::demo();
    let lagging = Arc::new(AtomicBool::new(true));
    harness.ctx.client = Arc::new(LaggingClient {
        inner: harness.server.client(),
        lagging: lagging.clone(),
    });
    let handle = harness.start(config(serde_json::json!({
        "Id": "dev1",
        "EndpointUrl": "opc.tcp://simulated:4840",
        "RequestTimeout": 1000,
    })));
    reach(&handle, ConnectorState::Subscribed).await;
    settle().await;

    let response = harness.request("Opc/dev1/Subscribe", subscribe("c1", COUNTER)).await;
    let fault = response.result.unwrap_err();
    assert_eq!(fault.code, FaultCode::Failed);
    assert!(fault.message.contains("timed out"), "{}", fault.message);

    // 迟到的监控项在应答到达后被删除
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(harness.server.live_monitored_items(), 0);

    lagging.store(false, Ordering::SeqCst);
    let retry = harness.request("Opc/dev1/Subscribe", subscribe("c1", COUNTER)).await;
    assert_eq!(retry.result, Ok(BusReply::Subscribe { ok: true }));
    assert_eq!(harness.server.live_monitored_items(), 1);
    assert_eq!(handle.state(), ConnectorState::Subscribed);
    handle.stop().await.unwrap();
}
