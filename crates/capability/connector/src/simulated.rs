//! 进程内模拟服务器
//!
//! 实现 [`ClientConnector`] / [`Session`]，用于测试与演示。可注入连接失败、连接延迟、
//! 订阅创建失败、订阅转移失败、连接丢失与服务故障，并暴露观测计数。

use crate::client::{
    ClientConnector, ClientSettings, EndpointDescription, MonitoredItemId, MonitoredItemRequest,
    MonitoredItemResult, Session, SessionEvent, SubscriptionId, select_endpoint,
};
use crate::error::ClientError;
use api_contract::{BrowseEntry, NodeClass, ServerInfo};
use async_trait::async_trait;
use domain::{BuiltinType, StatusCode, Value, Variant, now_epoch_ms};
use gw_config::Identity;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

pub const DEFAULT_ENDPOINT_URL: &str = "opc.tcp://simulated:4840";
const NONE_POLICY_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";

#[derive(Debug, Clone)]
struct SimNode {
    browse_name: String,
    node_class: NodeClass,
    data_type: Option<BuiltinType>,
    value: Option<Value>,
    children: Vec<String>,
}

#[derive(Debug)]
struct SimSubscription {
    session: u64,
    transferred: bool,
    items: HashMap<MonitoredItemId, (String, u32)>,
}

#[derive(Debug)]
struct ServerState {
    nodes: BTreeMap<String, SimNode>,
    endpoints: Vec<EndpointDescription>,
    connect_failures: u32,
    connect_latency: Duration,
    subscription_failures: u32,
    connect_attempts: u64,
    subscriptions_created: u64,
    required_identity: Identity,
    sessions: HashMap<u64, broadcast::Sender<SessionEvent>>,
    subscriptions: HashMap<SubscriptionId, SimSubscription>,
    next_session: u64,
    next_subscription: SubscriptionId,
    next_item: MonitoredItemId,
    last_endpoint: Option<String>,
    start_time_ms: i64,
}

impl ServerState {
    fn send(&self, session: u64, event: SessionEvent) {
        if let Some(sender) = self.sessions.get(&session) {
            let _ = sender.send(event);
        }
    }

    fn broadcast(&self, event: SessionEvent) {
        for sender in self.sessions.values() {
            let _ = sender.send(event.clone());
        }
    }

    fn notify_value(&self, node_id: &str, value: &Value) {
        for (subscription_id, subscription) in &self.subscriptions {
            if subscription.transferred {
                continue;
            }
            for (node, client_handle) in subscription.items.values() {
                if node == node_id {
                    self.send(
                        subscription.session,
                        SessionEvent::DataChange {
                            subscription: *subscription_id,
                            client_handle: *client_handle,
                            value: value.clone(),
                        },
                    );
                }
            }
        }
    }
}

/// 模拟服务器，可克隆，克隆共享同一地址空间。
#[derive(Debug, Clone)]
pub struct SimulatedServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedServer {
    /// 只有 Objects 文件夹的空地址空间，端点不加密。
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "i=85".to_string(),
            SimNode {
                browse_name: "Objects".to_string(),
                node_class: NodeClass::Object,
                data_type: None,
                value: None,
                children: Vec::new(),
            },
        );
        Self {
            state: Arc::new(Mutex::new(ServerState {
                nodes,
                endpoints: vec![EndpointDescription {
                    endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
                    security_policy_uri: NONE_POLICY_URI.to_string(),
                }],
                connect_failures: 0,
                connect_latency: Duration::ZERO,
                subscription_failures: 0,
                connect_attempts: 0,
                subscriptions_created: 0,
                required_identity: Identity::Anonymous,
                sessions: HashMap::new(),
                subscriptions: HashMap::new(),
                next_session: 1,
                next_subscription: 1,
                next_item: 1,
                last_endpoint: None,
                start_time_ms: now_epoch_ms(),
            })),
        }
    }

    /// 演示地址空间：`Objects/Demo/{Counter, Temperature, Switch, Name}`。
    pub fn demo() -> Self {
        let server = Self::new();
        server.add_object("i=85", "ns=2;s=Demo", "Demo");
        server.add_variable("ns=2;s=Demo", "ns=2;s=Demo/Counter", "Counter", Variant::Int32(0));
        server.add_variable(
            "ns=2;s=Demo",
            "ns=2;s=Demo/Temperature",
            "Temperature",
            Variant::Double(21.5),
        );
        server.add_variable("ns=2;s=Demo", "ns=2;s=Demo/Switch", "Switch", Variant::Boolean(false));
        server.add_variable(
            "ns=2;s=Demo",
            "ns=2;s=Demo/Name",
            "Name",
            Variant::String("demo".to_string()),
        );
        server
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_node(&self, parent: &str, node_id: &str, node: SimNode) {
        let mut state = self.lock();
        if let Some(parent) = state.nodes.get_mut(parent) {
            parent.children.push(node_id.to_string());
        }
        state.nodes.insert(node_id.to_string(), node);
    }

    pub fn add_object(&self, parent: &str, node_id: &str, browse_name: &str) {
        self.add_node(
            parent,
            node_id,
            SimNode {
                browse_name: browse_name.to_string(),
                node_class: NodeClass::Object,
                data_type: None,
                value: None,
                children: Vec::new(),
            },
        );
    }

    /// 变量的数据类型取自初始值。
    pub fn add_variable(&self, parent: &str, node_id: &str, browse_name: &str, initial: Variant) {
        self.add_node(
            parent,
            node_id,
            SimNode {
                browse_name: browse_name.to_string(),
                node_class: NodeClass::Variable,
                data_type: initial.builtin_type(),
                value: Some(Value::good(initial)),
                children: Vec::new(),
            },
        );
    }

    pub fn set_endpoints(&self, endpoints: Vec<EndpointDescription>) {
        self.lock().endpoints = endpoints;
    }

    /// 接下来 `count` 次连接失败。
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    /// 只接受给定用户名和密码的会话，匿名连接被拒绝。
    pub fn require_user(&self, username: &str, password: &str) {
        self.lock().required_identity = Identity::UserName {
            username: username.to_string(),
            password: password.to_string(),
        };
    }

    pub fn set_connect_latency(&self, latency: Duration) {
        self.lock().connect_latency = latency;
    }

    /// 接下来 `count` 次订阅创建失败。
    pub fn fail_next_subscriptions(&self, count: u32) {
        self.lock().subscription_failures = count;
    }

    /// 所有订阅转移失败；旧监控项保留到客户端删除为止。
    pub fn fail_transfer(&self) {
        let mut state = self.lock();
        let mut events = Vec::new();
        for (id, subscription) in state.subscriptions.iter_mut() {
            if !subscription.transferred {
                subscription.transferred = true;
                events.push((subscription.session, *id));
            }
        }
        for (session, subscription) in events {
            state.send(
                session,
                SessionEvent::TransferFailed {
                    subscription,
                    status: StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
                },
            );
        }
    }

    pub fn connection_lost(&self) {
        self.lock().broadcast(SessionEvent::ConnectionLost);
    }

    pub fn connection_restored(&self) {
        self.lock().broadcast(SessionEvent::ConnectionRestored);
    }

    pub fn service_fault(&self, status: StatusCode, message: &str) {
        self.lock().broadcast(SessionEvent::ServiceFault {
            status,
            message: message.to_string(),
        });
    }

    /// 更新变量值并通知监控它的订阅。
    pub fn update_value(&self, node_id: &str, variant: Variant) -> bool {
        let mut state = self.lock();
        let value = Value::good(variant);
        match state.nodes.get_mut(node_id) {
            Some(node) if node.node_class == NodeClass::Variable => {
                node.value = Some(value.clone());
            }
            _ => return false,
        }
        state.notify_value(node_id, &value);
        true
    }

    pub fn value(&self, node_id: &str) -> Option<Value> {
        self.lock().nodes.get(node_id).and_then(|n| n.value.clone())
    }

    pub fn connect_attempts(&self) -> u64 {
        self.lock().connect_attempts
    }

    pub fn sessions_open(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn subscriptions_created(&self) -> u64 {
        self.lock().subscriptions_created
    }

    /// 服务器端尚未删除的监控项，包括转移失败订阅上的。
    pub fn live_monitored_items(&self) -> usize {
        self.lock()
            .subscriptions
            .values()
            .map(|s| s.items.len())
            .sum()
    }

    /// 最近一次连接选中的端点地址。
    pub fn last_endpoint(&self) -> Option<String> {
        self.lock().last_endpoint.clone()
    }

    pub fn client(&self) -> SimulatedClient {
        SimulatedClient {
            server: self.clone(),
        }
    }
}

/// 连接到 [`SimulatedServer`] 的客户端。
#[derive(Debug, Clone)]
pub struct SimulatedClient {
    server: SimulatedServer,
}

impl SimulatedClient {
    pub fn new(server: SimulatedServer) -> Self {
        Self { server }
    }
}

#[async_trait]
impl ClientConnector for SimulatedClient {
    async fn connect(&self, settings: &ClientSettings) -> Result<Arc<dyn Session>, ClientError> {
        let latency = {
            let mut state = self.server.lock();
            state.connect_attempts += 1;
            state.connect_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.server.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ClientError::Connection(format!(
                "{}: connection refused",
                settings.endpoint_url
            )));
        }
        if state.required_identity != Identity::Anonymous
            && state.required_identity != settings.identity
        {
            return Err(ClientError::Connection(format!(
                "{}: user identity rejected",
                settings.endpoint_url
            )));
        }
        let endpoint = select_endpoint(&state.endpoints, settings).ok_or_else(|| {
            ClientError::NoMatchingEndpoint(format!("{:?}", settings.security_policy))
        })?;
        let id = state.next_session;
        state.next_session += 1;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        state.sessions.insert(id, events.clone());
        state.last_endpoint = Some(endpoint.endpoint_url);
        Ok(Arc::new(SimulatedSession {
            server: self.server.clone(),
            id,
            events,
        }))
    }
}

/// 模拟会话。
#[derive(Debug)]
pub struct SimulatedSession {
    server: SimulatedServer,
    id: u64,
    events: broadcast::Sender<SessionEvent>,
}

impl SimulatedSession {
    fn open_state(&self) -> Result<MutexGuard<'_, ServerState>, ClientError> {
        let state = self.server.lock();
        if state.sessions.contains_key(&self.id) {
            Ok(state)
        } else {
            Err(ClientError::SessionClosed)
        }
    }
}

fn unknown_node(node_id: &str) -> ClientError {
    ClientError::Service(StatusCode::BAD_NODE_ID_UNKNOWN, node_id.to_string())
}

fn invalid_subscription(subscription: SubscriptionId) -> ClientError {
    ClientError::Service(
        StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
        format!("subscription {subscription}"),
    )
}

#[async_trait]
impl Session for SimulatedSession {
    fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn create_subscription(
        &self,
        _publishing_interval: f64,
    ) -> Result<SubscriptionId, ClientError> {
        let mut state = self.open_state()?;
        if state.subscription_failures > 0 {
            state.subscription_failures -= 1;
            return Err(ClientError::Service(
                StatusCode::BAD,
                "too many subscriptions".to_string(),
            ));
        }
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.subscriptions_created += 1;
        state.subscriptions.insert(
            id,
            SimSubscription {
                session: self.id,
                transferred: false,
                items: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn create_monitored_items(
        &self,
        subscription: SubscriptionId,
        requests: Vec<MonitoredItemRequest>,
    ) -> Result<Vec<MonitoredItemResult>, ClientError> {
        let mut state = self.open_state()?;
        match state.subscriptions.get(&subscription) {
            Some(s) if s.session == self.id && !s.transferred => {}
            _ => return Err(invalid_subscription(subscription)),
        }

        let mut results = Vec::with_capacity(requests.len());
        let mut initial = Vec::new();
        for request in requests {
            let value = state
                .nodes
                .get(&request.node_id)
                .filter(|node| node.node_class == NodeClass::Variable)
                .and_then(|node| node.value.clone());
            let Some(value) = value else {
                results.push(MonitoredItemResult {
                    client_handle: request.client_handle,
                    node_id: request.node_id,
                    item_id: 0,
                    status: StatusCode::BAD_NODE_ID_UNKNOWN,
                });
                continue;
            };
            let item_id = state.next_item;
            state.next_item += 1;
            if let Some(s) = state.subscriptions.get_mut(&subscription) {
                s.items
                    .insert(item_id, (request.node_id.clone(), request.client_handle));
            }
            initial.push((request.client_handle, value));
            results.push(MonitoredItemResult {
                client_handle: request.client_handle,
                node_id: request.node_id,
                item_id,
                status: StatusCode::GOOD,
            });
        }
        for (client_handle, value) in initial {
            state.send(
                self.id,
                SessionEvent::DataChange {
                    subscription,
                    client_handle,
                    value,
                },
            );
        }
        Ok(results)
    }

    async fn delete_monitored_items(
        &self,
        subscription: SubscriptionId,
        items: Vec<MonitoredItemId>,
    ) -> Result<(), ClientError> {
        let mut state = self.open_state()?;
        let Some(s) = state.subscriptions.get_mut(&subscription) else {
            return Err(invalid_subscription(subscription));
        };
        for item in items {
            s.items.remove(&item);
        }
        if s.transferred && s.items.is_empty() {
            state.subscriptions.remove(&subscription);
        }
        Ok(())
    }

    async fn read(&self, node_ids: &[String]) -> Result<Vec<Value>, ClientError> {
        let state = self.open_state()?;
        Ok(node_ids
            .iter()
            .map(|node_id| {
                state
                    .nodes
                    .get(node_id)
                    .and_then(|node| node.value.clone())
                    .unwrap_or_else(|| Value::bad(StatusCode::BAD_NODE_ID_UNKNOWN))
            })
            .collect())
    }

    async fn write(&self, node_id: &str, value: Variant) -> Result<StatusCode, ClientError> {
        let mut state = self.open_state()?;
        let Some(node) = state.nodes.get_mut(node_id) else {
            return Ok(StatusCode::BAD_NODE_ID_UNKNOWN);
        };
        if node.node_class != NodeClass::Variable {
            return Ok(StatusCode::BAD_NOT_WRITABLE);
        }
        if value.builtin_type() != node.data_type {
            return Ok(StatusCode::BAD_TYPE_MISMATCH);
        }
        let value = Value::good(value);
        node.value = Some(value.clone());
        state.notify_value(node_id, &value);
        Ok(StatusCode::GOOD)
    }

    async fn data_type(&self, node_id: &str) -> Result<BuiltinType, ClientError> {
        let state = self.open_state()?;
        state
            .nodes
            .get(node_id)
            .and_then(|node| node.data_type)
            .ok_or_else(|| unknown_node(node_id))
    }

    async fn browse(&self, node_id: &str) -> Result<Vec<BrowseEntry>, ClientError> {
        let state = self.open_state()?;
        let node = state.nodes.get(node_id).ok_or_else(|| unknown_node(node_id))?;
        Ok(node
            .children
            .iter()
            .filter_map(|child_id| {
                state.nodes.get(child_id).map(|child| BrowseEntry {
                    browse_name: child.browse_name.clone(),
                    display_name: child.browse_name.clone(),
                    node_id: child_id.clone(),
                    node_class: child.node_class,
                })
            })
            .collect())
    }

    async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let state = self.open_state()?;
        Ok(ServerInfo {
            server_uris: vec!["urn:simulated:server".to_string()],
            namespaces: vec![
                "http://opcfoundation.org/UA/".to_string(),
                "urn:simulated:demo".to_string(),
            ],
            product_name: "Simulated Server".to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            build_number: "1".to_string(),
            start_time_ms: state.start_time_ms,
            current_time_ms: now_epoch_ms(),
            state: "Running".to_string(),
        })
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let mut state = self.server.lock();
        if state.sessions.remove(&self.id).is_none() {
            return Err(ClientError::SessionClosed);
        }
        state.subscriptions.retain(|_, s| s.session != self.id);
        Ok(())
    }
}
