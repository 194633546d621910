//! 网关运行配置加载。
//!
//! - [`AppConfig`]：进程级配置，来自环境变量
//! - [`ConnectorConfig`]：单个 connector 的配置，JSON（PascalCase 键）
//! - [`GatewayConfig`]：配置文件，包含全部 connector

pub mod connector;
pub mod gateway;

pub use connector::{
    ConnectorConfig, DataChangeTrigger, Identity, LogLevel, MonitoringParameters, SecurityPolicy,
};
pub use gateway::GatewayConfig;

use std::env;
use std::path::PathBuf;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("failed to read {0}: {1}")]
    Read(String, String),
}

/// 进程级运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 应用名，决定密钥库文件名
    pub app_name: String,
    /// 安全目录，密钥库位于 `<dir>/security/`
    pub security_dir: PathBuf,
    /// 总线地址根
    pub bus_root: String,
    /// connector 配置文件
    pub config_file: PathBuf,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_name = read_with_default("GATEWAY_APP_NAME", "automation-gateway");
        if app_name.trim().is_empty() || app_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid("GATEWAY_APP_NAME".to_string(), app_name));
        }
        let security_dir = PathBuf::from(read_with_default("GATEWAY_SECURITY_DIRECTORY", "."));
        let bus_root = read_with_default("GATEWAY_BUS_ROOT", "Opc");
        if bus_root.is_empty() || bus_root.ends_with('/') {
            return Err(ConfigError::Invalid("GATEWAY_BUS_ROOT".to_string(), bus_root));
        }
        let config_file = PathBuf::from(read_with_default("GATEWAY_CONFIG_FILE", "gateway.json"));

        Ok(Self {
            app_name,
            security_dir,
            bus_root,
            config_file,
        })
    }
}

/// 读取可选环境变量，空字符串视为未设置。
pub fn read_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_with_default(key: &str, default: &str) -> String {
    read_optional(key).unwrap_or_else(|| default.to_string())
}
