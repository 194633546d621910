//! 网关领域模型：Topic、Value 以及二者的组合。
//!
//! 该 crate 不依赖任何外部库，供 codec、bus、connector 等模块共享。

pub mod topic;
pub mod value;

pub use topic::{Format, SourceType, Topic, TopicType};
pub use value::{BuiltinType, StatusCode, TopicValue, Value, ValueParseError, Variant};

/// 当前 Unix 时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
