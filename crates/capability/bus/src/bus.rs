//! 地址路由与投递

use crate::error::BusError;
use api_contract::{BusRequest, BusResponse};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

/// 每个通知地址的广播缓冲长度。
const DEFAULT_NOTIFY_CAPACITY: usize = 1024;

struct Consumer {
    token: u64,
    sender: mpsc::Sender<Delivery>,
}

pub(crate) struct BusInner {
    consumers: RwLock<HashMap<String, Consumer>>,
    notifications: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
    next_token: AtomicU64,
    notify_capacity: usize,
}

/// 进程内总线，可克隆并在多个 connector 之间共享。
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusInner {
    /// 移除除 `held` 个接收端外已无人订阅的通知通道。
    pub(crate) fn prune_notifications(&self, address: &str, held: usize) {
        let Ok(mut notifications) = self.notifications.write() else {
            return;
        };
        if let Some(sender) = notifications.get(address)
            && sender.receiver_count() <= held
        {
            notifications.remove(address);
            debug!(target: "gw.bus", address, "notification_channel_pruned");
        }
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NOTIFY_CAPACITY)
    }

    /// 指定通知广播缓冲长度，慢订阅者超过该长度会丢失最旧的通知。
    pub fn with_capacity(notify_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                consumers: RwLock::new(HashMap::new()),
                notifications: RwLock::new(HashMap::new()),
                next_token: AtomicU64::new(1),
                notify_capacity: notify_capacity.max(1),
            }),
        }
    }

    /// 为地址注册唯一处理者，请求按到达顺序进入 `sender`。
    pub fn register(
        &self,
        address: impl Into<String>,
        sender: mpsc::Sender<Delivery>,
    ) -> Result<Registration, BusError> {
        let address = address.into();
        let mut consumers = self
            .inner
            .consumers
            .write()
            .map_err(|_| BusError::LockPoisoned)?;
        if consumers.contains_key(&address) {
            return Err(BusError::AddressInUse(address));
        }
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        consumers.insert(address.clone(), Consumer { token, sender });
        debug!(target: "gw.bus", address = %address, "handler_registered");
        Ok(Registration {
            inner: Arc::downgrade(&self.inner),
            address,
            token,
            active: true,
        })
    }

    pub fn is_registered(&self, address: &str) -> bool {
        self.inner
            .consumers
            .read()
            .map(|consumers| consumers.contains_key(address))
            .unwrap_or(false)
    }

    /// 已注册的地址（排序）。
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .inner
            .consumers
            .read()
            .map(|consumers| consumers.keys().cloned().collect())
            .unwrap_or_default();
        addresses.sort();
        addresses
    }

    /// 向地址发送请求并等待应答，只投递一次。
    pub async fn request(
        &self,
        address: &str,
        request: BusRequest,
    ) -> Result<BusResponse, BusError> {
        let sender = {
            let consumers = self
                .inner
                .consumers
                .read()
                .map_err(|_| BusError::LockPoisoned)?;
            consumers
                .get(address)
                .map(|consumer| consumer.sender.clone())
                .ok_or_else(|| BusError::NoHandler(address.to_string()))?
        };

        let (reply, response) = oneshot::channel();
        let delivery = Delivery {
            address: address.to_string(),
            request,
            reply: Responder { reply },
        };
        sender
            .send(delivery)
            .await
            .map_err(|_| BusError::NoHandler(address.to_string()))?;
        response
            .await
            .map_err(|_| BusError::HandlerDropped(address.to_string()))
    }

    /// 向地址广播通知，返回收到通知的订阅者数量。
    ///
    /// 订阅者已全部离开的地址在这里回收。
    pub fn publish(&self, address: &str, payload: Bytes) -> Result<usize, BusError> {
        let delivered = {
            let notifications = self
                .inner
                .notifications
                .read()
                .map_err(|_| BusError::LockPoisoned)?;
            match notifications.get(address) {
                Some(sender) => sender.send(payload).ok(),
                None => return Ok(0),
            }
        };
        match delivered {
            Some(count) => Ok(count),
            None => {
                self.inner.prune_notifications(address, 0);
                Ok(0)
            }
        }
    }

    /// 仍有通知通道的地址（排序）。
    pub fn notification_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .inner
            .notifications
            .read()
            .map(|notifications| notifications.keys().cloned().collect())
            .unwrap_or_default();
        addresses.sort();
        addresses
    }

    pub(crate) fn downgrade(&self) -> Weak<BusInner> {
        Arc::downgrade(&self.inner)
    }

    /// 订阅地址上的原始通知。
    pub fn subscribe(&self, address: &str) -> Result<broadcast::Receiver<Bytes>, BusError> {
        let mut notifications = self
            .inner
            .notifications
            .write()
            .map_err(|_| BusError::LockPoisoned)?;
        let capacity = self.inner.notify_capacity;
        Ok(notifications
            .entry(address.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe())
    }
}

/// 地址注册凭证；`unregister` 或 drop 时移除处理者。
pub struct Registration {
    inner: Weak<BusInner>,
    address: String,
    token: u64,
    active: bool,
}

impl Registration {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 移除本凭证对应的处理者，重复调用无副作用。
    ///
    /// 只删除自己注册的条目，不会误删同地址上后来的注册。
    pub fn unregister(&mut self) -> bool {
        if !std::mem::replace(&mut self.active, false) {
            return false;
        }
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let Ok(mut consumers) = inner.consumers.write() else {
            return false;
        };
        if consumers
            .get(&self.address)
            .is_some_and(|consumer| consumer.token == self.token)
        {
            consumers.remove(&self.address);
            debug!(target: "gw.bus", address = %self.address, "handler_unregistered");
            return true;
        }
        false
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// 投递给处理者的一条请求。
pub struct Delivery {
    pub address: String,
    pub request: BusRequest,
    reply: Responder,
}

impl Delivery {
    pub fn respond(self, response: BusResponse) {
        self.reply.send(response);
    }

    pub fn into_parts(self) -> (String, BusRequest, Responder) {
        (self.address, self.request, self.reply)
    }
}

/// 应答通道。
pub struct Responder {
    reply: oneshot::Sender<BusResponse>,
}

impl Responder {
    /// 请求方已放弃时应答被丢弃。
    pub fn send(self, response: BusResponse) {
        if self.reply.send(response).is_err() {
            debug!(target: "gw.bus", "requester_gone");
        }
    }
}
