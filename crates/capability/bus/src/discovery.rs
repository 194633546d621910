//! 服务发现记录

use crate::error::BusError;
use api_contract::ServiceRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// 服务发现注册中心（只关心公布契约）。
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// 公布记录，返回带注册 ID 的记录。
    async fn publish(&self, record: ServiceRecord) -> Result<ServiceRecord, BusError>;

    /// 撤销记录，返回是否存在。
    async fn unpublish(&self, registration: &str) -> Result<bool, BusError>;

    async fn records(&self) -> Result<Vec<ServiceRecord>, BusError>;
}

/// 内存注册中心
pub struct InMemoryServiceRegistry {
    records: RwLock<HashMap<String, ServiceRecord>>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// 当前记录数量（用于测试）
    pub fn len(&self) -> usize {
        self.records.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryServiceRegistry {
    async fn publish(&self, mut record: ServiceRecord) -> Result<ServiceRecord, BusError> {
        let registration = uuid::Uuid::new_v4().to_string();
        record.registration = Some(registration.clone());
        let mut records = self.records.write().map_err(|_| BusError::LockPoisoned)?;
        records.insert(registration.clone(), record.clone());
        info!(
            target: "gw.bus",
            name = %record.name,
            service_type = %record.service_type,
            endpoint = %record.endpoint,
            registration = %registration,
            "service_published"
        );
        Ok(record)
    }

    async fn unpublish(&self, registration: &str) -> Result<bool, BusError> {
        let mut records = self.records.write().map_err(|_| BusError::LockPoisoned)?;
        Ok(records.remove(registration).is_some())
    }

    async fn records(&self) -> Result<Vec<ServiceRecord>, BusError> {
        let records = self.records.read().map_err(|_| BusError::LockPoisoned)?;
        let mut list: Vec<ServiceRecord> = records.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }
}
