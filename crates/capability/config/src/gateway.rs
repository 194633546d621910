//! 网关配置文件
//!
//! ```json
//! { "OpcUaClient": [ { "Id": "dev1", "EndpointUrl": "opc.tcp://host:4840" } ] }
//! ```

use crate::{ConfigError, ConnectorConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawGatewayConfig {
    #[serde(rename = "OpcUaClient", default)]
    opc_ua_client: Vec<serde_json::Value>,
}

/// 配置文件中的全部 connector，按文件顺序。
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub connectors: Vec<ConnectorConfig>,
}

impl GatewayConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?;
        Self::from_json(&json)
    }

    /// 解析并逐项校验；connector ID 重复视为错误。
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawGatewayConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut connectors = Vec::with_capacity(raw.opc_ua_client.len());
        for (index, entry) in raw.opc_ua_client.into_iter().enumerate() {
            let config = ConnectorConfig::from_value(entry).map_err(|e| match e {
                ConfigError::Parse(msg) => ConfigError::Parse(format!("OpcUaClient[{index}]: {msg}")),
                other => other,
            })?;
            if !seen.insert(config.id.clone()) {
                return Err(ConfigError::Invalid("Id".to_string(), format!("duplicate {}", config.id)));
            }
            connectors.push(config);
        }
        Ok(Self { connectors })
    }

    /// 启用的 connector。
    pub fn enabled(&self) -> impl Iterator<Item = &ConnectorConfig> {
        self.connectors.iter().filter(|c| c.enabled)
    }
}
