//! 安全引导：进程级只读身份（客户端证书 + 密钥对）。
//!
//! 进程启动时调用一次 [`SecurityContext::bootstrap`]，之后以 `Arc<SecurityContext>`
//! 注入每个 connector。密钥库不存在时生成自签名证书，证书 SAN 覆盖本机所有可解析的
//! 主机名与地址，之后的启动直接复用。

pub mod error;
pub mod hostnames;
pub mod keystore;

pub use error::SecurityError;
pub use keystore::keystore_path;

use keystore::StoredIdentity;
use rcgen::{CertificateParams, KeyPair, SanType};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// 客户端证书。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    pem: String,
    subject_alt_names: Vec<String>,
}

impl ClientCertificate {
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// DNS 与 IP 类型的 SAN。
    pub fn subject_alt_names(&self) -> &[String] {
        &self.subject_alt_names
    }
}

/// 客户端密钥对。
#[derive(Clone)]
pub struct ClientKeyPair {
    private_key_pem: String,
    public_key_pem: String,
}

impl ClientKeyPair {
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}

impl fmt::Debug for ClientKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientKeyPair")
            .field("public_key_pem", &self.public_key_pem)
            .field("private_key_pem", &"***")
            .finish()
    }
}

/// 进程级安全上下文，构造后只读。
#[derive(Debug)]
pub struct SecurityContext {
    application_uri: String,
    keystore_path: PathBuf,
    certificate: ClientCertificate,
    key_pair: ClientKeyPair,
}

impl SecurityContext {
    /// 加载或生成 `<security_dir>/security/<app_name>.pfx`。
    pub fn bootstrap(security_dir: &Path, app_name: &str) -> Result<Self, SecurityError> {
        let path = keystore_path(security_dir, app_name);
        let stored = match keystore::load(&path)? {
            Some(stored) => {
                info!(target: "gw.security", path = %path.display(), "keystore_loaded");
                stored
            }
            None => {
                let hostname =
                    hostnames::local_hostname().unwrap_or_else(|| "localhost".to_string());
                let application_uri = format!("urn:{hostname}:{app_name}");
                keystore::generate(&path, app_name, &application_uri)?
            }
        };
        Self::from_stored(path, stored)
    }

    fn from_stored(path: PathBuf, stored: StoredIdentity) -> Result<Self, SecurityError> {
        let invalid = |reason: String| {
            SecurityError::InvalidKeyStore(path.display().to_string(), reason)
        };
        let key_pair =
            KeyPair::from_pem(&stored.private_key_pem).map_err(|e| invalid(e.to_string()))?;
        let params = CertificateParams::from_ca_cert_pem(&stored.certificate_pem)
            .map_err(|e| invalid(e.to_string()))?;

        let mut application_uri = None;
        let mut subject_alt_names = Vec::new();
        for san in &params.subject_alt_names {
            match san {
                SanType::URI(uri) => application_uri = Some(uri.as_str().to_string()),
                SanType::DnsName(name) => subject_alt_names.push(name.as_str().to_string()),
                SanType::IpAddress(ip) => subject_alt_names.push(ip.to_string()),
                _ => {}
            }
        }
        let application_uri =
            application_uri.ok_or_else(|| invalid("certificate has no application uri".to_string()))?;

        Ok(Self {
            application_uri,
            keystore_path: path,
            certificate: ClientCertificate {
                pem: stored.certificate_pem,
                subject_alt_names,
            },
            key_pair: ClientKeyPair {
                public_key_pem: key_pair.public_key_pem(),
                private_key_pem: stored.private_key_pem,
            },
        })
    }

    /// 客户端证书。
    pub fn certificate(&self) -> &ClientCertificate {
        &self.certificate
    }

    /// 客户端密钥对。
    pub fn key_pair(&self) -> &ClientKeyPair {
        &self.key_pair
    }

    /// 证书中的应用 URI，会话建立时作为客户端 ApplicationUri。
    pub fn application_uri(&self) -> &str {
        &self.application_uri
    }

    pub fn keystore_path(&self) -> &Path {
        &self.keystore_path
    }
}
