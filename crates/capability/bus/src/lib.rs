//! 进程内消息总线
//!
//! - 请求/应答：按地址注册唯一处理者，单次投递（at-most-once），重试由调用方负责
//! - 发布/订阅：按地址广播编码后的通知
//! - 服务发现：connector 启动后公布自己的端点

pub mod bus;
pub mod discovery;
pub mod error;
pub mod notify;

pub use bus::{Delivery, MessageBus, Registration, Responder};
pub use discovery::{InMemoryServiceRegistry, ServiceRegistry};
pub use error::BusError;
pub use notify::ValueSubscription;
