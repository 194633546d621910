#![allow(dead_code)]

use api_contract::{BusRequest, BusResponse};
use gw_bus::{InMemoryServiceRegistry, MessageBus};
use gw_config::ConnectorConfig;
use gw_connector::{
    Connector, ConnectorContext, ConnectorHandle, ConnectorState, OpcUaHandler, SimulatedServer,
};
use gw_security::SecurityContext;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub server: SimulatedServer,
    pub bus: MessageBus,
    pub registry: Arc<InMemoryServiceRegistry>,
    pub ctx: ConnectorContext,
    _security_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(server: SimulatedServer) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let security =
            Arc::new(SecurityContext::bootstrap(dir.path(), "connector-test").expect("bootstrap"));
        let bus = MessageBus::new();
        let registry = Arc::new(InMemoryServiceRegistry::new());
        let ctx = ConnectorContext {
            client: Arc::new(server.client()),
            security,
            bus: bus.clone(),
            registry: registry.clone(),
            bus_root: "Opc".to_string(),
        };
        Self {
            server,
            bus,
            registry,
            ctx,
            _security_dir: dir,
        }
    }

    pub fn demo() -> Self {
        Self::new(SimulatedServer::demo())
    }

    pub fn start(&self, config: ConnectorConfig) -> ConnectorHandle {
        Connector::new(config, OpcUaHandler::new(), self.ctx.clone())
            .expect("valid config")
            .start()
    }

    pub async fn request(&self, address: &str, request: BusRequest) -> BusResponse {
        self.bus.request(address, request).await.expect("bus request")
    }
}

pub fn config(value: serde_json::Value) -> ConnectorConfig {
    ConnectorConfig::from_value(value).expect("config")
}

pub fn dev_config(id: &str) -> ConnectorConfig {
    config(serde_json::json!({
        "Id": id,
        "EndpointUrl": "opc.tcp://simulated:4840",
    }))
}

/// 在模拟时间内等待状态，超时视为失败。
pub async fn reach(handle: &ConnectorHandle, target: ConnectorState) {
    let reached = tokio::time::timeout(Duration::from_secs(120), handle.wait_for(target))
        .await
        .expect("state not reached in time");
    assert_eq!(reached, target);
}

/// 让分发任务处理完已排队的事件。
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
