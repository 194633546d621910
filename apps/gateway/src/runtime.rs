//! 网关运行时：按配置启动全部 connector，统一停止。

use gw_config::{ConfigError, GatewayConfig};
use gw_connector::{
    Connector, ConnectorContext, ConnectorError, ConnectorHandle, ConnectorState, OpcUaHandler,
};
use gw_security::SecurityError;
use tracing::{info, warn};

/// 网关启动与停止错误。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("security error: {0}")]
    Security(#[from] SecurityError),
    #[error("connector {0}: {1}")]
    Connector(String, ConnectorError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 运行中的 connector 集合。
pub struct Gateway {
    connectors: Vec<ConnectorHandle>,
}

impl Gateway {
    /// 启动所有启用的 connector。
    ///
    /// 先校验全部配置，任一无效则一个都不启动。
    pub fn start(config: &GatewayConfig, ctx: ConnectorContext) -> Result<Self, GatewayError> {
        let mut pending = Vec::new();
        for connector in config.enabled() {
            let built = Connector::new(connector.clone(), OpcUaHandler::new(), ctx.clone())
                .map_err(|e| GatewayError::Connector(connector.id.clone(), e))?;
            pending.push(built);
        }
        for skipped in config.connectors.iter().filter(|c| !c.enabled) {
            info!(target: "gw.gateway", connector_id = %skipped.id, "connector_disabled");
        }

        let connectors: Vec<ConnectorHandle> =
            pending.into_iter().map(Connector::start).collect();
        info!(target: "gw.gateway", connectors = connectors.len(), "gateway_started");
        Ok(Self { connectors })
    }

    pub fn connector_ids(&self) -> Vec<&str> {
        self.connectors.iter().map(ConnectorHandle::id).collect()
    }

    /// 各 connector 当前状态，按启动顺序。
    pub fn states(&self) -> Vec<(String, ConnectorState)> {
        self.connectors
            .iter()
            .map(|c| (c.id().to_string(), c.state()))
            .collect()
    }

    pub fn connector(&self, id: &str) -> Option<&ConnectorHandle> {
        self.connectors.iter().find(|c| c.id() == id)
    }

    /// 按启动的逆序停止全部 connector；单个失败不影响其余，返回第一个错误。
    pub async fn stop(self) -> Result<(), GatewayError> {
        let mut first_error = None;
        for connector in self.connectors.into_iter().rev() {
            let id = connector.id().to_string();
            if let Err(err) = connector.stop().await {
                warn!(target: "gw.gateway", connector_id = %id, error = %err, "connector_stop_failed");
                first_error.get_or_insert(GatewayError::Connector(id, err));
            }
        }
        info!(target: "gw.gateway", "gateway_stopped");
        first_error.map_or(Ok(()), Err)
    }
}
