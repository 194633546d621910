//! 自动化协议网关进程入口：加载配置、准备证书、启动 connector，Ctrl-C 停止。

mod runtime;

use gw_bus::{InMemoryServiceRegistry, MessageBus};
use gw_config::{AppConfig, GatewayConfig};
use gw_connector::{ConnectorContext, SimulatedServer};
use gw_security::SecurityContext;
use gw_telemetry::{connector_directive, init_tracing_with};
use runtime::{Gateway, GatewayError};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let app = AppConfig::from_env()?;
    let config = GatewayConfig::from_file(&app.config_file)?;

    // connector 级日志级别
    let directives: Vec<String> = config
        .enabled()
        .map(|c| connector_directive(&c.id, c.log_level.as_directive()))
        .collect();
    init_tracing_with(&directives);

    let security = Arc::new(SecurityContext::bootstrap(&app.security_dir, &app.app_name)?);
    info!(
        target: "gw.gateway",
        application_uri = %security.application_uri(),
        keystore = %security.keystore_path().display(),
        "security_ready"
    );

    // 进程内上游：演示地址空间
    let upstream = SimulatedServer::demo();
    let bus = MessageBus::new();
    let ctx = ConnectorContext {
        client: Arc::new(upstream.client()),
        security,
        bus,
        registry: Arc::new(InMemoryServiceRegistry::new()),
        bus_root: app.bus_root.clone(),
    };

    let gateway = Gateway::start(&config, ctx)?;
    tokio::signal::ctrl_c().await?;
    info!(target: "gw.gateway", "shutdown_requested");
    gateway.stop().await
}
