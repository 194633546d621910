//! 编解码错误类型定义

/// 解码失败：截断、标签损坏或长度不符。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// 缓冲区短于声明长度
    #[error("truncated: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// 未知的类型标签
    #[error("unknown {kind} tag: {tag}")]
    UnknownTag { kind: &'static str, tag: u8 },

    /// 字符串不是合法 UTF-8
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    /// 数组嵌套过深
    #[error("array nesting deeper than {0}")]
    TooDeep(usize),

    /// 载荷解码后与长度前缀不一致
    #[error("{kind} body used {used} of {declared} declared bytes")]
    InvalidLength {
        kind: &'static str,
        declared: usize,
        used: usize,
    },

    /// 载荷超出 u32 长度前缀的表示范围
    #[error("payload of {0} bytes exceeds the length prefix range")]
    TooLarge(usize),
}
