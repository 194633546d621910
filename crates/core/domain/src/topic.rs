//! Topic：数据点的规范化地址。
//!
//! 名称格式为 `{SourceType}/{system}/{Node|Path}[:Format]/{address}`，
//! 例如 `Opc/dev1/Node/ns=2;s=Demo/Counter` 或 `Opc/dev1/Path/$objects/Demo/#`。
//! 相等性与哈希只取 `(source_type, path)`，派生字段不参与比较。

use std::fmt;
use std::hash::{Hash, Hasher};

/// 数据来源的系统类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    Unknown,
    Sys,
    Opc,
    Plc,
    Mqtt,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::Unknown,
        SourceType::Sys,
        SourceType::Opc,
        SourceType::Plc,
        SourceType::Mqtt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Unknown => "Unknown",
            SourceType::Sys => "$SYS",
            SourceType::Opc => "Opc",
            SourceType::Plc => "Plc",
            SourceType::Mqtt => "Mqtt",
        }
    }

    /// 按名称前缀识别（大小写不敏感），未知前缀返回 `Unknown`。
    pub fn from_prefix(prefix: &str) -> SourceType {
        [SourceType::Sys, SourceType::Opc, SourceType::Plc, SourceType::Mqtt]
            .into_iter()
            .find(|candidate| candidate.as_str().eq_ignore_ascii_case(prefix))
            .unwrap_or(SourceType::Unknown)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 地址类型：单个节点或浏览路径。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicType {
    Unknown,
    Node,
    Path,
}

/// 订阅方期望的通知渲染格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Json,
    Pretty,
    Value,
}

impl Format {
    fn from_suffix(suffix: &str) -> Option<Format> {
        match suffix.to_ascii_lowercase().as_str() {
            "" | "json" => Some(Format::Json),
            "pretty" => Some(Format::Pretty),
            "value" => Some(Format::Value),
            _ => None,
        }
    }
}

/// 数据点的规范化地址，同时作为总线路由键与映射键。
#[derive(Debug, Clone)]
pub struct Topic {
    source_type: SourceType,
    path: String,
    system_name: String,
    topic_type: TopicType,
    format: Format,
    address: String,
}

struct ParsedPath {
    system_name: String,
    topic_type: TopicType,
    format: Format,
    address: String,
}

impl ParsedPath {
    fn unknown() -> Self {
        Self {
            system_name: String::new(),
            topic_type: TopicType::Unknown,
            format: Format::Json,
            address: String::new(),
        }
    }
}

impl Topic {
    /// 由来源类型与路径（不含来源前缀）构造。
    pub fn new(source_type: SourceType, path: impl Into<String>) -> Self {
        let path = path.into();
        let parsed = parse_path(source_type, &path);
        Self {
            source_type,
            path,
            system_name: parsed.system_name,
            topic_type: parsed.topic_type,
            format: parsed.format,
            address: parsed.address,
        }
    }

    /// 解析完整名称；无法识别的名称得到 `SourceType::Unknown`。
    pub fn parse(name: &str) -> Self {
        match name.split_once('/') {
            Some((prefix, rest)) => match SourceType::from_prefix(prefix) {
                SourceType::Unknown => Topic::new(SourceType::Unknown, name),
                source_type => Topic::new(source_type, rest),
            },
            None => Topic::new(SourceType::Unknown, name),
        }
    }

    /// 完整名称，`Topic::parse(&t.name()) == t`。
    pub fn name(&self) -> String {
        match self.source_type {
            SourceType::Unknown => self.path.clone(),
            other => format!("{}/{}", other.as_str(), self.path),
        }
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    pub fn topic_type(&self) -> TopicType {
        self.topic_type
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// 节点 ID（Node）或浏览路径（Path）。
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_valid(&self) -> bool {
        self.source_type != SourceType::Unknown && self.topic_type != TopicType::Unknown
    }

    /// 同一系统、同一格式下指向单个节点的 Topic。
    pub fn node_topic(&self, node_id: &str) -> Topic {
        let kind = match self.format {
            Format::Json => "Node",
            Format::Pretty => "Node:Pretty",
            Format::Value => "Node:Value",
        };
        Topic::new(
            self.source_type,
            format!("{}/{kind}/{node_id}", self.system_name),
        )
    }

    /// 浏览路径分段，`\/` 表示名称中的字面斜杠。
    pub fn browse_path(&self) -> Vec<String> {
        let mut items = Vec::new();
        let mut current = String::new();
        let mut chars = self.address.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'/') => {
                    current.push('/');
                    chars.next();
                }
                '/' => items.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
        items.push(current);
        items
    }
}

impl PartialEq for Topic {
    fn eq(&self, other: &Self) -> bool {
        self.source_type == other.source_type && self.path == other.path
    }
}

impl Eq for Topic {}

impl Hash for Topic {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source_type.hash(state);
        self.path.hash(state);
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn parse_path(source_type: SourceType, path: &str) -> ParsedPath {
    match source_type {
        SourceType::Unknown => ParsedPath::unknown(),
        SourceType::Sys => ParsedPath {
            system_name: String::new(),
            topic_type: TopicType::Path,
            format: Format::Json,
            address: path.to_string(),
        },
        SourceType::Opc | SourceType::Plc | SourceType::Mqtt => {
            let mut parts = path.splitn(3, '/');
            let (Some(system), Some(kind), Some(rest)) = (parts.next(), parts.next(), parts.next())
            else {
                return ParsedPath::unknown();
            };
            if !is_word(system) || rest.is_empty() {
                return ParsedPath::unknown();
            }
            let (kind, suffix) = kind.split_once(':').unwrap_or((kind, ""));
            let Some(format) = Format::from_suffix(suffix) else {
                return ParsedPath::unknown();
            };
            let topic_type = if kind.eq_ignore_ascii_case("node") {
                TopicType::Node
            } else if kind.eq_ignore_ascii_case("path") {
                TopicType::Path
            } else {
                return ParsedPath::unknown();
            };
            let address = match (source_type, topic_type) {
                (SourceType::Opc, TopicType::Node) => opc_node_address(rest),
                (SourceType::Opc, TopicType::Path) if rest.contains('/') => rest.to_string(),
                (SourceType::Plc, TopicType::Node) | (SourceType::Mqtt, TopicType::Path) => {
                    rest.to_string()
                }
                _ => return ParsedPath::unknown(),
            };
            ParsedPath {
                system_name: system.to_string(),
                topic_type,
                format,
                address,
            }
        }
    }
}

/// `2/Demo/Counter` 简写展开为 `ns=2;s=Demo/Counter`。
fn opc_node_address(rest: &str) -> String {
    if let Some((ns, id)) = rest.split_once('/')
        && !ns.is_empty()
        && ns.bytes().all(|b| b.is_ascii_digit())
    {
        return format!("ns={ns};s={id}");
    }
    rest.to_string()
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}
