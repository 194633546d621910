//! connector 生命周期
//!
//! 每个 connector 由一个分发任务驱动，串行处理：
//!
//! - 连接 / 订阅创建的完成通知
//! - 总线请求（同一地址上的请求全序）
//! - 会话事件（故障、连接状态、订阅转移失败、数据变化）
//!
//! 连接与重试在独立的 worker 任务中进行，分发任务不会阻塞在网络 I/O 上。
//! 连接失败按固定间隔无限重试；订阅创建失败只记录，不重试。

use crate::client::{ClientConnector, ClientSettings, Session, SessionEvent, SubscriptionId};
use crate::error::{ClientError, ConnectorError};
use crate::handler::{HandlerContext, ProtocolHandler};
use crate::retry::{RetryDecision, RetryTimer};
use crate::state::{ConnectorState, ConnectorStats, ConnectorStatsSnapshot};
use crate::subscription::{SubscriptionHandle, TopicRegistry};
use crate::timed::TimedSession;
use api_contract::{
    BusAddress, BusFault, BusResponse, ServiceRecord, SubscribeRequest, connector_endpoint,
};
use domain::{Topic, TopicValue, Value};
use gw_bus::{Delivery, MessageBus, Registration, ServiceRegistry};
use gw_config::ConnectorConfig;
use gw_security::SecurityContext;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

/// 总线请求队列长度。
const DELIVERY_CAPACITY: usize = 256;
const COMPLETION_CAPACITY: usize = 16;

/// 所有 connector 共享的协作者。
#[derive(Clone)]
pub struct ConnectorContext {
    pub client: Arc<dyn ClientConnector>,
    pub security: Arc<SecurityContext>,
    pub bus: MessageBus,
    pub registry: Arc<dyn ServiceRegistry>,
    pub bus_root: String,
}

/// 尚未启动的 connector。
pub struct Connector<H> {
    config: Arc<ConnectorConfig>,
    handler: Arc<H>,
    ctx: ConnectorContext,
}

impl<H: ProtocolHandler> Connector<H> {
    /// 配置非法时返回错误，connector 不会启动。
    pub fn new(
        config: ConnectorConfig,
        handler: H,
        ctx: ConnectorContext,
    ) -> Result<Self, ConnectorError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            handler: Arc::new(handler),
            ctx,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// 启动分发任务，立即返回。
    pub fn start(self) -> ConnectorHandle {
        let (state_tx, state_rx) = watch::channel(ConnectorState::Created);
        let (deliveries_tx, deliveries) = mpsc::channel(DELIVERY_CAPACITY);
        let (completions_tx, completions) = mpsc::channel(COMPLETION_CAPACITY);
        let cancel = CancellationToken::new();
        let disposed = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ConnectorStats::default());
        let settings = Arc::new(ClientSettings::from_config(&self.config, &self.ctx.security));

        let runtime = Runtime {
            config: self.config.clone(),
            handler: self.handler,
            ctx: self.ctx,
            settings,
            state: state_tx,
            stats: stats.clone(),
            cancel: cancel.clone(),
            disposed: disposed.clone(),
            session: None,
            events: None,
            subscription: None,
            topics: TopicRegistry::new(),
            registrations: Vec::new(),
            discovery: None,
            recovering: false,
            deliveries_tx,
            deliveries,
            completions_tx,
            completions,
        };
        let span = info_span!("connector", id = %self.config.id);
        let task = tokio::spawn(runtime.run().instrument(span));

        ConnectorHandle {
            id: self.config.id.clone(),
            state: state_rx,
            stats,
            cancel,
            disposed,
            task: Some(task),
        }
    }
}

/// 运行中的 connector；drop 时停止分发任务但不等待。
pub struct ConnectorHandle {
    id: String,
    state: watch::Receiver<ConnectorState>,
    stats: Arc<ConnectorStats>,
    cancel: CancellationToken,
    disposed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ConnectorHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    /// 等待进入 `target` 状态；connector 先终止时返回 `Terminated`。
    pub async fn wait_for(&self, target: ConnectorState) -> ConnectorState {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s == target || *s == ConnectorState::Terminated)
            .await
            .map(|s| *s);
        reached.unwrap_or_else(|_| *self.state.borrow())
    }

    /// 订阅状态变化。
    pub fn watch(&self) -> watch::Receiver<ConnectorState> {
        self.state.clone()
    }

    pub fn stats(&self) -> ConnectorStatsSnapshot {
        self.stats.snapshot()
    }

    /// 停止 connector：先注销总线处理者，再断开连接，断开完成（成功或失败）后返回。
    pub async fn stop(mut self) -> Result<(), ConnectorError> {
        self.disposed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|err| ConnectorError::Join(err.to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for ConnectorHandle {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

/// 回到分发任务的完成通知。
enum Completion {
    Connected(Arc<dyn Session>),
    Subscription(Result<SubscriptionId, ClientError>),
}

struct Runtime<H> {
    config: Arc<ConnectorConfig>,
    handler: Arc<H>,
    ctx: ConnectorContext,
    settings: Arc<ClientSettings>,
    state: watch::Sender<ConnectorState>,
    stats: Arc<ConnectorStats>,
    cancel: CancellationToken,
    disposed: Arc<AtomicBool>,
    session: Option<Arc<dyn Session>>,
    events: Option<broadcast::Receiver<SessionEvent>>,
    subscription: Option<SubscriptionHandle>,
    topics: TopicRegistry,
    registrations: Vec<Registration>,
    discovery: Option<String>,
    recovering: bool,
    deliveries_tx: mpsc::Sender<Delivery>,
    deliveries: mpsc::Receiver<Delivery>,
    completions_tx: mpsc::Sender<Completion>,
    completions: mpsc::Receiver<Completion>,
}

/// 没有会话时永远挂起。
async fn next_event(
    events: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> Result<SessionEvent, RecvError> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

impl<H: ProtocolHandler> Runtime<H> {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn current_state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectorState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(
                target: "gw.connector",
                connector_id = %self.id(),
                from = %previous,
                to = %next,
                "state_changed"
            );
        }
    }

    async fn run(mut self) {
        self.set_state(ConnectorState::Connecting);
        let worker = self.spawn_connect();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(completion) = self.completions.recv() => self.on_completion(completion).await,
                Some(delivery) = self.deliveries.recv() => self.dispatch(delivery).await,
                event = next_event(&mut self.events) => self.on_event(event).await,
            }
        }

        self.shutdown(worker).await;
    }

    fn spawn_connect(&self) -> JoinHandle<()> {
        let worker = ConnectWorker {
            connector_id: self.id().to_string(),
            client: self.ctx.client.clone(),
            settings: self.settings.clone(),
            stats: self.stats.clone(),
            timer: RetryTimer::new(
                self.config.retry_delay,
                self.cancel.child_token(),
                self.disposed.clone(),
            ),
            completions: self.completions_tx.clone(),
        };
        tokio::spawn(worker.run().in_current_span())
    }

    fn spawn_create_subscription(&self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let interval = self.config.subscription_sampling_interval;
        let completions = self.completions_tx.clone();
        tokio::spawn(
            async move {
                let result = session.create_subscription(interval).await;
                let _ = completions.send(Completion::Subscription(result)).await;
            }
            .in_current_span(),
        );
    }

    async fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connected(session) => {
                self.stats.record_session_established();
                info!(
                    target: "gw.connector",
                    connector_id = %self.id(),
                    endpoint = %self.settings.endpoint_url,
                    "session_established"
                );
                self.events = Some(session.events());
                let session: Arc<dyn Session> =
                    Arc::new(TimedSession::new(session, self.config.request_timeout));
                self.session = Some(session);
                self.set_state(ConnectorState::Connected);
                self.spawn_create_subscription();
            }
            Completion::Subscription(Ok(id)) => self.on_subscription_created(id).await,
            Completion::Subscription(Err(err)) => {
                self.stats.record_subscription_failure();
                error!(
                    target: "gw.connector",
                    connector_id = %self.id(),
                    error = %err,
                    "subscription_create_failed"
                );
            }
        }
    }

    async fn on_subscription_created(&mut self, id: SubscriptionId) {
        self.stats.record_subscription_created();
        info!(
            target: "gw.connector",
            connector_id = %self.id(),
            subscription_id = id,
            "subscription_created"
        );
        self.subscription = Some(SubscriptionHandle::new(id));
        self.set_state(ConnectorState::Subscribed);

        let Some(session) = self.session.clone() else {
            return;
        };
        if let Some(subscription) = self.subscription.as_mut() {
            let mut ctx = HandlerContext {
                connector_id: &self.config.id,
                session: &session,
                subscription,
                topics: &mut self.topics,
                monitoring: &self.config.monitoring,
            };
            self.handler.resubscribe(&mut ctx).await;
        }

        if std::mem::take(&mut self.recovering) {
            info!(
                target: "gw.connector",
                connector_id = %self.id(),
                topics = self.topics.len(),
                "subscription_recovered"
            );
            return;
        }
        if self.registrations.is_empty() {
            self.bind_operations();
            self.publish_discovery().await;
            self.subscribe_on_startup(&session).await;
        }
    }

    fn bind_operations(&mut self) {
        for address in BusAddress::all_for(&self.ctx.bus_root, &self.config.id) {
            let address = address.to_string();
            match self.ctx.bus.register(address.clone(), self.deliveries_tx.clone()) {
                Ok(registration) => self.registrations.push(registration),
                Err(err) => error!(
                    target: "gw.connector",
                    connector_id = %self.id(),
                    address = %address,
                    error = %err,
                    "handler_register_failed"
                ),
            }
        }
        info!(
            target: "gw.connector",
            connector_id = %self.id(),
            handlers = self.registrations.len(),
            "handlers_bound"
        );
    }

    async fn publish_discovery(&mut self) {
        let record = ServiceRecord::new(
            self.config.id.clone(),
            self.ctx.bus_root.clone(),
            connector_endpoint(&self.ctx.bus_root, &self.config.id),
        );
        match self.ctx.registry.publish(record).await {
            Ok(published) => self.discovery = published.registration,
            Err(err) => warn!(
                target: "gw.connector",
                connector_id = %self.id(),
                error = %err,
                "discovery_publish_failed"
            ),
        }
    }

    async fn subscribe_on_startup(&mut self, session: &Arc<dyn Session>) {
        let source_type = self.handler.source_type();
        for path in &self.config.subscribe_on_startup {
            let topic = Topic::new(source_type, format!("{}/{}", self.config.id, path));
            let Some(subscription) = self.subscription.as_mut() else {
                return;
            };
            let mut ctx = HandlerContext {
                connector_id: &self.config.id,
                session,
                subscription,
                topics: &mut self.topics,
                monitoring: &self.config.monitoring,
            };
            let request = SubscribeRequest {
                id: gw_telemetry::new_request_id(),
                client_id: self.config.id.clone(),
                topic: topic.clone(),
            };
            match self.handler.subscribe(&mut ctx, request).await {
                Ok(reply) => info!(
                    target: "gw.connector",
                    connector_id = %self.config.id,
                    topic = %topic,
                    reply = ?reply,
                    "startup_subscribed"
                ),
                Err(fault) => warn!(
                    target: "gw.connector",
                    connector_id = %self.config.id,
                    topic = %topic,
                    error = %fault,
                    "startup_subscribe_failed"
                ),
            }
        }
    }

    async fn on_event(&mut self, event: Result<SessionEvent, RecvError>) {
        let event = match event {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(target: "gw.connector", connector_id = %self.id(), skipped, "session_events_lagged");
                return;
            }
            Err(RecvError::Closed) => {
                self.events = None;
                return;
            }
        };

        match event {
            SessionEvent::ServiceFault { status, message } => {
                self.handler.on_service_fault(&self.config.id, status, &message);
            }
            SessionEvent::ConnectionLost => {
                warn!(target: "gw.connector", connector_id = %self.id(), "connection_lost");
                if self.current_state() == ConnectorState::Subscribed {
                    self.set_state(ConnectorState::Reconnecting);
                }
            }
            SessionEvent::ConnectionRestored => {
                info!(target: "gw.connector", connector_id = %self.id(), "connection_restored");
                if self.current_state() == ConnectorState::Reconnecting
                    && self.subscription.is_some()
                {
                    self.set_state(ConnectorState::Subscribed);
                }
            }
            SessionEvent::KeepAlive { subscription } => {
                trace!(target: "gw.connector", connector_id = %self.id(), subscription, "keep_alive");
            }
            SessionEvent::StatusChanged {
                subscription,
                status,
            } => {
                info!(
                    target: "gw.connector",
                    connector_id = %self.id(),
                    subscription,
                    status = %status,
                    "subscription_status_changed"
                );
            }
            SessionEvent::NotificationDataLost { subscription } => {
                warn!(
                    target: "gw.connector",
                    connector_id = %self.id(),
                    subscription,
                    "notification_data_lost"
                );
            }
            SessionEvent::TransferFailed {
                subscription,
                status,
            } => self.on_transfer_failed(subscription, status).await,
            SessionEvent::DataChange {
                subscription,
                client_handle,
                value,
            } => self.on_data_change(subscription, client_handle, value),
        }
    }

    /// 删除旧订阅上的全部监控项，然后立即重建订阅。
    async fn on_transfer_failed(&mut self, subscription: SubscriptionId, status: domain::StatusCode) {
        if self.subscription.as_ref().map(SubscriptionHandle::id) != Some(subscription) {
            debug!(
                target: "gw.connector",
                connector_id = %self.id(),
                subscription,
                "stale_transfer_failure_ignored"
            );
            return;
        }
        warn!(
            target: "gw.connector",
            connector_id = %self.id(),
            subscription,
            status = %status,
            "subscription_transfer_failed"
        );
        self.set_state(ConnectorState::Reconnecting);
        self.stats.record_transfer_recovery();

        if let (Some(session), Some(old)) = (self.session.clone(), self.subscription.take()) {
            let items = old.all_items();
            if !items.is_empty()
                && let Err(err) = session.delete_monitored_items(old.id(), items).await
            {
                warn!(
                    target: "gw.connector",
                    connector_id = %self.id(),
                    subscription,
                    error = %err,
                    "monitored_items_delete_failed"
                );
            }
        }
        self.recovering = true;
        self.spawn_create_subscription();
    }

    fn on_data_change(&self, subscription: SubscriptionId, client_handle: u32, value: Value) {
        let Some(handle) = self.subscription.as_ref().filter(|h| h.id() == subscription) else {
            return;
        };
        let Some((topic, value_topic)) = handle.route(client_handle) else {
            return;
        };
        let address = topic.name();
        match gw_codec::encode(&TopicValue::new(value_topic.clone(), value)) {
            Ok(payload) => {
                if let Err(err) = self.ctx.bus.publish(&address, payload) {
                    warn!(target: "gw.connector", address = %address, error = %err, "value_publish_failed");
                    return;
                }
                self.stats.record_value_published();
            }
            Err(err) => {
                warn!(target: "gw.connector", address = %address, error = %err, "value_encode_failed");
            }
        }
    }

    async fn dispatch(&mut self, delivery: Delivery) {
        let (address, request, responder) = delivery.into_parts();
        let id = request.id().to_string();
        let state = self.current_state();

        let (Some(session), Some(subscription), true) = (
            self.session.clone(),
            self.subscription.as_mut(),
            state.accepts_requests(),
        ) else {
            self.stats.record_request_unavailable();
            debug!(
                target: "gw.connector",
                connector_id = %self.config.id,
                address = %address,
                state = %state,
                "request_unavailable"
            );
            responder.send(BusResponse::fault(
                id,
                BusFault::unavailable(&self.config.id, state.as_str()),
            ));
            return;
        };

        let operation = request.operation();
        if BusAddress::parse(&address).map(|a| a.operation) != Some(operation) {
            responder.send(BusResponse::fault(
                id,
                BusFault::invalid_request(format!("{operation} request sent to {address}")),
            ));
            return;
        }

        self.stats.record_request_dispatched();
        let mut ctx = HandlerContext {
            connector_id: &self.config.id,
            session: &session,
            subscription,
            topics: &mut self.topics,
            monitoring: &self.config.monitoring,
        };
        // 单次服务调用由 TimedSession 限时，处理器总是执行到底
        let result = self.handler.handle(&mut ctx, request).await;
        debug!(
            target: "gw.connector",
            connector_id = %self.config.id,
            operation = %operation,
            request_id = %id,
            ok = result.is_ok(),
            "request_handled"
        );
        responder.send(BusResponse { id, result });
    }

    /// 注销处理者 → 撤销发现记录 → 等待连接 worker → 断开连接 → Terminated。
    async fn shutdown(mut self, worker: JoinHandle<()>) {
        for registration in &mut self.registrations {
            registration.unregister();
        }
        self.registrations.clear();
        debug!(target: "gw.connector", connector_id = %self.id(), "handlers_unregistered");

        if let Some(registration) = self.discovery.take()
            && let Err(err) = self.ctx.registry.unpublish(&registration).await
        {
            warn!(
                target: "gw.connector",
                connector_id = %self.id(),
                error = %err,
                "discovery_unpublish_failed"
            );
        }

        self.deliveries.close();
        while let Ok(delivery) = self.deliveries.try_recv() {
            let id = delivery.request.id().to_string();
            delivery.respond(BusResponse::fault(
                id,
                BusFault::unavailable(&self.config.id, ConnectorState::Terminated.as_str()),
            ));
        }

        if let Err(err) = worker.await {
            warn!(target: "gw.connector", connector_id = %self.id(), error = %err, "connect_worker_failed");
        }
        self.completions.close();
        while let Ok(completion) = self.completions.try_recv() {
            if let Completion::Connected(late) = completion {
                close_session(&self.config.id, late.as_ref()).await;
            }
        }

        if let Some(session) = self.session.take() {
            close_session(&self.config.id, session.as_ref()).await;
        }
        self.subscription = None;
        self.events = None;
        self.set_state(ConnectorState::Terminated);
    }
}

async fn close_session(connector_id: &str, session: &dyn Session) {
    match session.disconnect().await {
        Ok(()) => info!(target: "gw.connector", connector_id = %connector_id, "session_closed"),
        Err(err) => warn!(
            target: "gw.connector",
            connector_id = %connector_id,
            error = %err,
            "session_close_failed"
        ),
    }
}

/// 连接与重试，运行在分发任务之外。
struct ConnectWorker {
    connector_id: String,
    client: Arc<dyn ClientConnector>,
    settings: Arc<ClientSettings>,
    stats: Arc<ConnectorStats>,
    timer: RetryTimer,
    completions: mpsc::Sender<Completion>,
}

impl ConnectWorker {
    async fn run(self) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            self.stats.record_connect_attempt();
            debug!(
                target: "gw.connector",
                connector_id = %self.connector_id,
                endpoint = %self.settings.endpoint_url,
                attempt,
                "connecting"
            );
            let result = match tokio::time::timeout(
                self.settings.connect_timeout,
                self.client.connect(&self.settings),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout(format!(
                    "connect to {} after {}ms",
                    self.settings.endpoint_url,
                    self.settings.connect_timeout.as_millis()
                ))),
            };

            match result {
                Ok(session) => {
                    self.deliver(session).await;
                    return;
                }
                Err(err) => {
                    self.stats.record_connect_retry();
                    warn!(
                        target: "gw.connector",
                        connector_id = %self.connector_id,
                        endpoint = %self.settings.endpoint_url,
                        attempt,
                        retry_in_ms = self.timer.delay().as_millis() as u64,
                        error = %err,
                        "connect_failed_retrying"
                    );
                }
            }

            match self.timer.wait().await {
                RetryDecision::Reconnect => {}
                RetryDecision::Cancelled => {
                    debug!(target: "gw.connector", connector_id = %self.connector_id, "connect_retry_cancelled");
                    return;
                }
                RetryDecision::Disposed => {
                    info!(target: "gw.connector", connector_id = %self.connector_id, "connect_retry_skipped_disposed");
                    return;
                }
            }
        }
    }

    /// 停止期间才建立的会话直接关闭。
    async fn deliver(&self, session: Arc<dyn Session>) {
        if self.timer.is_disposed() {
            close_session(&self.connector_id, session.as_ref()).await;
            return;
        }
        if let Err(mpsc::error::SendError(Completion::Connected(session))) =
            self.completions.send(Completion::Connected(session)).await
        {
            close_session(&self.connector_id, session.as_ref()).await;
        }
    }
}
