//! 安全引导错误类型定义

/// 进程启动时的安全引导失败，属于致命错误。
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 证书生成或解析失败
    #[error("certificate error: {0}")]
    Certificate(String),

    /// 密钥库内容损坏
    #[error("invalid keystore {0}: {1}")]
    InvalidKeyStore(String, String),
}

impl From<rcgen::Error> for SecurityError {
    fn from(err: rcgen::Error) -> Self {
        Self::Certificate(err.to_string())
    }
}
