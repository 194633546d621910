//! Connector 配置
//!
//! ## 配置示例
//!
//! ```json
//! {
//!   "Id": "dev1",
//!   "EndpointUrl": "opc.tcp://plc.local:4840",
//!   "UpdateEndpointUrl": "opc.tcp://10.0.0.5:4840",
//!   "SecurityPolicyUri": "http://opcfoundation.org/UA/SecurityPolicy#None",
//!   "UsernameProvider": { "Username": "operator", "Password": "secret" },
//!   "RequestTimeout": 5000,
//!   "LogLevel": "FINE"
//! }
//! ```
//!
//! 未给出的字段取默认值；校验失败时构造直接报错，connector 不会启动。

use crate::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const SECURITY_POLICY_PREFIX: &str = "http://opcfoundation.org/UA/SecurityPolicy#";

/// 安全策略；`Any` 表示未配置，接受服务器提供的任意端点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    Any,
    None,
    Basic128Rsa15,
    Basic256,
    Basic256Sha256,
    Aes128Sha256RsaOaep,
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    const KNOWN: [(SecurityPolicy, &'static str); 6] = [
        (SecurityPolicy::None, "None"),
        (SecurityPolicy::Basic128Rsa15, "Basic128Rsa15"),
        (SecurityPolicy::Basic256, "Basic256"),
        (SecurityPolicy::Basic256Sha256, "Basic256Sha256"),
        (SecurityPolicy::Aes128Sha256RsaOaep, "Aes128_Sha256_RsaOaep"),
        (SecurityPolicy::Aes256Sha256RsaPss, "Aes256_Sha256_RsaPss"),
    ];

    pub fn from_uri(uri: &str) -> Option<SecurityPolicy> {
        let name = uri.strip_prefix(SECURITY_POLICY_PREFIX)?;
        Self::KNOWN
            .iter()
            .find(|(_, known)| *known == name)
            .map(|(policy, _)| *policy)
    }

    /// 策略 URI；`Any` 没有 URI。
    pub fn uri(&self) -> Option<String> {
        Self::KNOWN
            .iter()
            .find(|(policy, _)| policy == self)
            .map(|(_, name)| format!("{SECURITY_POLICY_PREFIX}{name}"))
    }

    /// 端点的策略 URI 是否满足本策略。
    pub fn accepts(&self, endpoint_policy_uri: &str) -> bool {
        match self {
            SecurityPolicy::Any => true,
            other => other.uri().as_deref() == Some(endpoint_policy_uri),
        }
    }
}

/// 会话身份。
#[derive(Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    UserName { username: String, password: String },
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous => f.write_str("Anonymous"),
            Identity::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// 日志级别，兼容 `FINE`/`WARNING`/`SEVERE` 等写法。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(name: &str) -> Option<LogLevel> {
        let level = match name.trim().to_ascii_uppercase().as_str() {
            "OFF" => LogLevel::Off,
            "SEVERE" | "ERROR" => LogLevel::Error,
            "WARNING" | "WARN" => LogLevel::Warn,
            "INFO" => LogLevel::Info,
            "CONFIG" | "FINE" | "DEBUG" => LogLevel::Debug,
            "FINER" | "FINEST" | "TRACE" | "ALL" => LogLevel::Trace,
            _ => return None,
        };
        Some(level)
    }

    /// tracing 过滤指令中的级别名。
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// 数据变化通知的触发条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChangeTrigger {
    Status,
    StatusValue,
    StatusValueTimestamp,
}

impl DataChangeTrigger {
    fn parse(name: &str) -> Option<DataChangeTrigger> {
        match name {
            "Status" => Some(DataChangeTrigger::Status),
            "StatusValue" => Some(DataChangeTrigger::StatusValue),
            "StatusValueTimestamp" => Some(DataChangeTrigger::StatusValueTimestamp),
            _ => None,
        }
    }
}

/// 监控项参数。
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringParameters {
    /// 服务端队列长度
    pub buffer_size: u32,
    /// 采样间隔（毫秒），0 表示最快
    pub sampling_interval: f64,
    pub discard_oldest: bool,
    pub data_change_trigger: DataChangeTrigger,
}

impl Default for MonitoringParameters {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            sampling_interval: 0.0,
            discard_oldest: false,
            data_change_trigger: DataChangeTrigger::StatusValueTimestamp,
        }
    }
}

/// 单个 connector 的配置，构造后不可变。
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfig {
    pub id: String,
    pub enabled: bool,
    pub endpoint_url: String,
    /// 覆盖服务器返回端点中的地址：完整 URL 或仅主机名
    pub update_endpoint_url: Option<String>,
    pub security_policy: SecurityPolicy,
    pub identity: Identity,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub keep_alive_failures_allowed: u32,
    /// 订阅发布间隔（毫秒）
    pub subscription_sampling_interval: f64,
    pub log_level: LogLevel,
    /// 连接失败后的固定重试间隔
    pub retry_delay: Duration,
    /// 启动时订阅的 Topic，相对于 `{SourceType}/{Id}/`
    pub subscribe_on_startup: Vec<String>,
    pub monitoring: MonitoringParameters,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawUsernameProvider {
    username: Option<String>,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMonitoringParameters {
    #[serde(default = "default_buffer_size")]
    buffer_size: u32,
    #[serde(default)]
    sampling_interval: f64,
    #[serde(default)]
    discard_oldest: bool,
    #[serde(default = "default_data_change_trigger")]
    data_change_trigger: String,
}

impl Default for RawMonitoringParameters {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            sampling_interval: 0.0,
            discard_oldest: false,
            data_change_trigger: default_data_change_trigger(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawConnectorConfig {
    #[serde(default = "default_enabled")]
    enabled: bool,
    id: Option<String>,
    endpoint_url: Option<String>,
    update_endpoint_url: Option<String>,
    security_policy_uri: Option<String>,
    username_provider: Option<RawUsernameProvider>,
    #[serde(default = "default_timeout_ms")]
    request_timeout: u64,
    #[serde(default = "default_timeout_ms")]
    connect_timeout: u64,
    #[serde(default)]
    keep_alive_failures_allowed: u32,
    #[serde(default)]
    subscription_sampling_interval: f64,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_retry_wait_ms")]
    retry_wait_time: u64,
    #[serde(default)]
    subscribe_on_startup: Vec<String>,
    #[serde(default)]
    monitoring_parameters: RawMonitoringParameters,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_retry_wait_ms() -> u64 {
    5000
}

fn default_buffer_size() -> u32 {
    100
}

fn default_data_change_trigger() -> String {
    "StatusValueTimestamp".to_string()
}

impl ConnectorConfig {
    /// 从 JSON 字符串解析并校验。
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// 从 JSON 值解析并校验。
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawConnectorConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let id = raw.id.ok_or_else(|| ConfigError::Missing("Id".to_string()))?;
        let endpoint_url = raw
            .endpoint_url
            .ok_or_else(|| ConfigError::Missing("EndpointUrl".to_string()))?;

        let security_policy = match raw.security_policy_uri.as_deref() {
            None | Some("") => SecurityPolicy::Any,
            Some(uri) => SecurityPolicy::from_uri(uri).ok_or_else(|| {
                ConfigError::Invalid("SecurityPolicyUri".to_string(), uri.to_string())
            })?,
        };

        let identity = match raw.username_provider {
            None => Identity::Anonymous,
            Some(provider) => Identity::UserName {
                username: provider
                    .username
                    .ok_or_else(|| ConfigError::Missing("UsernameProvider.Username".to_string()))?,
                password: provider.password,
            },
        };

        let log_level = LogLevel::parse(&raw.log_level)
            .ok_or_else(|| ConfigError::Invalid("LogLevel".to_string(), raw.log_level.clone()))?;

        let monitoring = MonitoringParameters {
            buffer_size: raw.monitoring_parameters.buffer_size,
            sampling_interval: raw.monitoring_parameters.sampling_interval,
            discard_oldest: raw.monitoring_parameters.discard_oldest,
            data_change_trigger: DataChangeTrigger::parse(
                &raw.monitoring_parameters.data_change_trigger,
            )
            .ok_or_else(|| {
                ConfigError::Invalid(
                    "MonitoringParameters.DataChangeTrigger".to_string(),
                    raw.monitoring_parameters.data_change_trigger.clone(),
                )
            })?,
        };

        let config = Self {
            id,
            enabled: raw.enabled,
            endpoint_url,
            update_endpoint_url: raw.update_endpoint_url.filter(|url| !url.is_empty()),
            security_policy,
            identity,
            request_timeout: Duration::from_millis(raw.request_timeout),
            connect_timeout: Duration::from_millis(raw.connect_timeout),
            keep_alive_failures_allowed: raw.keep_alive_failures_allowed,
            subscription_sampling_interval: raw.subscription_sampling_interval,
            log_level,
            retry_delay: Duration::from_millis(raw.retry_wait_time),
            subscribe_on_startup: raw.subscribe_on_startup,
            monitoring,
        };
        config.validate()?;
        Ok(config)
    }

    /// 校验不变量；connector 构造时也会调用。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() || self.id.contains('/') || self.id.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::Invalid("Id".to_string(), self.id.clone()));
        }
        validate_url("EndpointUrl", &self.endpoint_url)?;
        if let Some(update) = &self.update_endpoint_url {
            if update.contains("://") {
                validate_url("UpdateEndpointUrl", update)?;
            } else if update.contains('/') || update.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(
                    "UpdateEndpointUrl".to_string(),
                    update.clone(),
                ));
            }
        }
        if let Identity::UserName { username, .. } = &self.identity
            && username.trim().is_empty()
        {
            return Err(ConfigError::Missing("UsernameProvider.Username".to_string()));
        }
        for (key, value) in [
            ("RequestTimeout", self.request_timeout),
            ("ConnectTimeout", self.connect_timeout),
            ("RetryWaitTime", self.retry_delay),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
            }
        }
        for (key, value) in [
            (
                "SubscriptionSamplingInterval",
                self.subscription_sampling_interval,
            ),
            (
                "MonitoringParameters.SamplingInterval",
                self.monitoring.sampling_interval,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(key.to_string(), value.to_string()));
            }
        }
        if self.monitoring.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "MonitoringParameters.BufferSize".to_string(),
                "0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 要求 `scheme://host...` 形式。
fn validate_url(key: &str, url: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::Invalid(key.to_string(), url.to_string());
    let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
    let valid_scheme = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    if !valid_scheme || host.is_empty() || url.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(())
}
