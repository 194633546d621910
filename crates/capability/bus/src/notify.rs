//! 值通知订阅

use crate::bus::{BusInner, MessageBus};
use crate::error::BusError;
use bytes::Bytes;
use domain::TopicValue;
use std::sync::Weak;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// 解码 Topic 通知的订阅者。
///
/// 无法解码的消息记录日志后丢弃，不会中断订阅。
/// 最后一个订阅者 drop 时回收该地址的通知通道。
pub struct ValueSubscription {
    address: String,
    receiver: broadcast::Receiver<Bytes>,
    bus: Weak<BusInner>,
}

impl MessageBus {
    /// 订阅 Topic 名称上的值通知。
    pub fn subscribe_values(&self, address: &str) -> Result<ValueSubscription, BusError> {
        Ok(ValueSubscription {
            address: address.to_string(),
            receiver: self.subscribe(address)?,
            bus: self.downgrade(),
        })
    }
}

impl ValueSubscription {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// 下一个可解码的通知；总线关闭时返回 `None`。
    pub async fn next(&mut self) -> Option<TopicValue> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => match gw_codec::decode::<TopicValue>(&payload) {
                    Ok(value) => return Some(value),
                    Err(err) => {
                        gw_telemetry::record_decode_failure();
                        warn!(
                            target: "gw.bus",
                            address = %self.address,
                            error = %err,
                            "notification_decode_failed"
                        );
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "gw.bus", address = %self.address, skipped, "notification_lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ValueSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner.prune_notifications(&self.address, 1);
        }
    }
}
