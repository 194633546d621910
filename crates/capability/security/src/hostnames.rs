//! 本机可解析名称，写入证书的 SAN。

use std::collections::BTreeSet;
use std::net::{IpAddr, ToSocketAddrs};

/// 本机主机名：`HOSTNAME` 环境变量，其次 `/etc/hostname`。
pub fn local_hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn resolve(host: &str) -> Vec<IpAddr> {
    (host, 0)
        .to_socket_addrs()
        .map(|addrs| addrs.map(|addr| addr.ip()).collect())
        .unwrap_or_default()
}

/// 所有可解析的本机名称与地址（去重、排序）。
pub fn local_subject_names() -> Vec<String> {
    let mut names: BTreeSet<String> = ["localhost", "127.0.0.1"]
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut hosts = vec!["localhost".to_string()];
    if let Some(hostname) = local_hostname() {
        names.insert(hostname.clone());
        hosts.push(hostname);
    }
    for host in hosts {
        for ip in resolve(&host) {
            if !ip.is_unspecified() {
                names.insert(ip.to_string());
            }
        }
    }
    names.into_iter().collect()
}
