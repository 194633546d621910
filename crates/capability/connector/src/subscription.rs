//! 订阅管理
//!
//! - [`TopicRegistry`]：每个 Topic 的客户端集合，跨恢复保留
//! - [`SubscriptionHandle`]：服务器端订阅及其监控项，转移失败后整体重建

use crate::client::{MonitoredItemId, MonitoredItemResult, SubscriptionId};
use domain::Topic;
use std::collections::{HashMap, HashSet};

/// 客户端对 Topic 的引用计数。
#[derive(Debug, Default)]
pub struct TopicRegistry {
    clients: HashMap<Topic, HashSet<String>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回 `(该 Topic 的客户端数, 是否新增)`。
    pub fn add_client(&mut self, topic: &Topic, client_id: &str) -> (usize, bool) {
        let clients = self.clients.entry(topic.clone()).or_default();
        let added = clients.insert(client_id.to_string());
        (clients.len(), added)
    }

    /// 返回 `(剩余客户端数, 是否移除)`；最后一个客户端离开时 Topic 被删除。
    pub fn remove_client(&mut self, topic: &Topic, client_id: &str) -> (usize, bool) {
        let Some(clients) = self.clients.get_mut(topic) else {
            return (0, false);
        };
        let removed = clients.remove(client_id);
        let count = clients.len();
        if count == 0 {
            self.clients.remove(topic);
        }
        (count, removed)
    }

    pub fn client_count(&self, topic: &Topic) -> usize {
        self.clients.get(topic).map(HashSet::len).unwrap_or(0)
    }

    /// 当前有客户端的 Topic（按名称排序）。
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.clients.keys().cloned().collect();
        topics.sort_by_key(Topic::name);
        topics
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// 一个已创建的监控项。
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItem {
    pub item_id: MonitoredItemId,
    pub client_handle: u32,
    pub node_id: String,
    /// 通知载荷中的 Topic：Node 订阅为订阅 Topic 本身，Path 订阅为解析出的节点
    pub value_topic: Topic,
}

/// 服务器端订阅。
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    next_handle: u32,
    items: HashMap<Topic, Vec<MonitoredItem>>,
    handles: HashMap<u32, (Topic, Topic)>,
}

impl SubscriptionHandle {
    pub fn new(id: SubscriptionId) -> Self {
        Self {
            id,
            next_handle: 1,
            items: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn next_client_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        handle
    }

    /// 记录创建成功的监控项，非 good 状态的结果被忽略并返回 `false`。
    pub fn add_monitored_item(
        &mut self,
        topic: &Topic,
        value_topic: Topic,
        result: &MonitoredItemResult,
    ) -> bool {
        if !result.status.is_good() {
            return false;
        }
        self.handles
            .insert(result.client_handle, (topic.clone(), value_topic.clone()));
        self.items.entry(topic.clone()).or_default().push(MonitoredItem {
            item_id: result.item_id,
            client_handle: result.client_handle,
            node_id: result.node_id.clone(),
            value_topic,
        });
        true
    }

    /// 删除 Topic 的全部监控项，返回需要在服务器端删除的项 ID。
    pub fn remove_topic(&mut self, topic: &Topic) -> Vec<MonitoredItemId> {
        let items = self.items.remove(topic).unwrap_or_default();
        for item in &items {
            self.handles.remove(&item.client_handle);
        }
        items.iter().map(|item| item.item_id).collect()
    }

    pub fn all_items(&self) -> Vec<MonitoredItemId> {
        let mut ids: Vec<MonitoredItemId> = self
            .items
            .values()
            .flatten()
            .map(|item| item.item_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 通知路由：`(订阅 Topic, 载荷 Topic)`。
    pub fn route(&self, client_handle: u32) -> Option<&(Topic, Topic)> {
        self.handles.get(&client_handle)
    }

    pub fn items_for(&self, topic: &Topic) -> &[MonitoredItem] {
        self.items.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_topic(&self, topic: &Topic) -> bool {
        self.items.contains_key(topic)
    }

    pub fn item_count(&self) -> usize {
        self.handles.len()
    }
}
