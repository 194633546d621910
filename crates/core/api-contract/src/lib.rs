//! 总线契约：地址规则、7 个操作的请求/应答与类型化错误。

use domain::{Topic, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 每个 connector 在总线上注册的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    ServerInfo,
    Subscribe,
    Unsubscribe,
    Publish,
    Read,
    Write,
    Browse,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::ServerInfo,
        Operation::Subscribe,
        Operation::Unsubscribe,
        Operation::Publish,
        Operation::Read,
        Operation::Write,
        Operation::Browse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ServerInfo => "ServerInfo",
            Operation::Subscribe => "Subscribe",
            Operation::Unsubscribe => "Unsubscribe",
            Operation::Publish => "Publish",
            Operation::Read => "Read",
            Operation::Write => "Write",
            Operation::Browse => "Browse",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation: {s}"))
    }
}

/// 总线地址 `{root}/{connector_id}/{operation}`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusAddress {
    pub root: String,
    pub connector_id: String,
    pub operation: Operation,
}

impl BusAddress {
    pub fn new(root: impl Into<String>, connector_id: impl Into<String>, operation: Operation) -> Self {
        Self {
            root: root.into(),
            connector_id: connector_id.into(),
            operation,
        }
    }

    /// 某个 connector 的全部 7 个地址。
    pub fn all_for(root: &str, connector_id: &str) -> Vec<BusAddress> {
        Operation::ALL
            .into_iter()
            .map(|op| BusAddress::new(root, connector_id, op))
            .collect()
    }

    /// 解析形如 `Opc/dev1/Read` 的地址。
    pub fn parse(address: &str) -> Option<BusAddress> {
        let (endpoint, op) = address.rsplit_once('/')?;
        let (root, connector_id) = endpoint.rsplit_once('/')?;
        if root.is_empty() || connector_id.is_empty() {
            return None;
        }
        Some(BusAddress::new(root, connector_id, op.parse().ok()?))
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.root, self.connector_id, self.operation)
    }
}

/// connector 的服务端点 `{root}/{connector_id}`，发现记录中公布此值。
pub fn connector_endpoint(root: &str, connector_id: &str) -> String {
    format!("{root}/{connector_id}")
}

/// 查询服务器信息。
#[derive(Debug, Clone)]
pub struct ServerInfoRequest {
    pub id: String,
}

/// 订阅 Topic，`client_id` 用于引用计数。
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub id: String,
    pub client_id: String,
    pub topic: Topic,
}

/// 取消订阅。
#[derive(Debug, Clone)]
pub struct UnsubscribeRequest {
    pub id: String,
    pub client_id: String,
    pub topics: Vec<Topic>,
}

/// 发布（写入）载荷：已类型化的值，或按节点数据类型转换的文本。
#[derive(Debug, Clone)]
pub enum PublishPayload {
    Value(Value),
    Text(String),
}

/// 向 Topic 发布一个值。
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub id: String,
    pub topic: Topic,
    pub payload: PublishPayload,
}

/// 读取一个或多个节点。
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub id: String,
    pub node_ids: Vec<String>,
}

/// 单个写入项，值为文本，按节点数据类型转换。
#[derive(Debug, Clone)]
pub struct WriteItem {
    pub node_id: String,
    pub value: String,
}

/// 写入一个或多个节点。
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub id: String,
    pub items: Vec<WriteItem>,
}

/// 浏览某个节点的直接子节点。
#[derive(Debug, Clone)]
pub struct BrowseRequest {
    pub id: String,
    pub node_id: String,
}

/// 总线请求。
#[derive(Debug, Clone)]
pub enum BusRequest {
    ServerInfo(ServerInfoRequest),
    Subscribe(SubscribeRequest),
    Unsubscribe(UnsubscribeRequest),
    Publish(PublishRequest),
    Read(ReadRequest),
    Write(WriteRequest),
    Browse(BrowseRequest),
}

impl BusRequest {
    pub fn id(&self) -> &str {
        match self {
            BusRequest::ServerInfo(r) => &r.id,
            BusRequest::Subscribe(r) => &r.id,
            BusRequest::Unsubscribe(r) => &r.id,
            BusRequest::Publish(r) => &r.id,
            BusRequest::Read(r) => &r.id,
            BusRequest::Write(r) => &r.id,
            BusRequest::Browse(r) => &r.id,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            BusRequest::ServerInfo(_) => Operation::ServerInfo,
            BusRequest::Subscribe(_) => Operation::Subscribe,
            BusRequest::Unsubscribe(_) => Operation::Unsubscribe,
            BusRequest::Publish(_) => Operation::Publish,
            BusRequest::Read(_) => Operation::Read,
            BusRequest::Write(_) => Operation::Write,
            BusRequest::Browse(_) => Operation::Browse,
        }
    }
}

/// 服务器信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    pub server_uris: Vec<String>,
    pub namespaces: Vec<String>,
    pub product_name: String,
    pub software_version: String,
    pub build_number: String,
    pub start_time_ms: i64,
    pub current_time_ms: i64,
    pub state: String,
}

/// 节点类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeClass {
    Object,
    Variable,
    Method,
    ObjectType,
    VariableType,
    DataType,
    ReferenceType,
    View,
}

/// 浏览结果中的一项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrowseEntry {
    pub browse_name: String,
    pub display_name: String,
    pub node_id: String,
    pub node_class: NodeClass,
}

/// 成功应答。
#[derive(Debug, Clone, PartialEq)]
pub enum BusReply {
    ServerInfo(ServerInfo),
    Subscribe { ok: bool },
    Unsubscribe { ok: bool },
    Publish { ok: bool },
    /// 与请求的节点一一对应
    Read(Vec<Value>),
    /// 与请求的写入项一一对应
    Write(Vec<bool>),
    Browse(Vec<BrowseEntry>),
}

/// 错误码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    /// connector 当前不处于 Subscribed 状态
    Unavailable,
    InvalidRequest,
    NotSupported,
    Failed,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::Unavailable => "BUS.UNAVAILABLE",
            FaultCode::InvalidRequest => "BUS.INVALID_REQUEST",
            FaultCode::NotSupported => "BUS.NOT_SUPPORTED",
            FaultCode::Failed => "BUS.FAILED",
        }
    }
}

/// 类型化的失败应答。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFault {
    pub code: FaultCode,
    pub message: String,
}

impl BusFault {
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// connector 未就绪，`state` 为当前状态名。
    pub fn unavailable(connector_id: &str, state: &str) -> Self {
        Self::new(
            FaultCode::Unavailable,
            format!("connector {connector_id} is {state}"),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FaultCode::InvalidRequest, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(FaultCode::NotSupported, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(FaultCode::Failed, message)
    }

    pub fn is_unavailable(&self) -> bool {
        self.code == FaultCode::Unavailable
    }
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

/// 应答信封，`id` 回显请求 ID。
#[derive(Debug, Clone, PartialEq)]
pub struct BusResponse {
    pub id: String,
    pub result: Result<BusReply, BusFault>,
}

impl BusResponse {
    pub fn ok(id: impl Into<String>, reply: BusReply) -> Self {
        Self {
            id: id.into(),
            result: Ok(reply),
        }
    }

    pub fn fault(id: impl Into<String>, fault: BusFault) -> Self {
        Self {
            id: id.into(),
            result: Err(fault),
        }
    }
}

/// 发现服务记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRecord {
    pub name: String,
    pub service_type: String,
    pub endpoint: String,
    /// 发布后由注册中心分配
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<String>,
}

impl ServiceRecord {
    pub fn new(
        name: impl Into<String>,
        service_type: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_type: service_type.into(),
            endpoint: endpoint.into(),
            registration: None,
        }
    }

    /// 记录的位置信息 `{"endpoint": ...}`。
    pub fn location(&self) -> serde_json::Value {
        serde_json::json!({ "endpoint": self.endpoint })
    }
}
