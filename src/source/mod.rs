//! 配置源：按启动参数加载一份完整配置快照
//!
//! 所有配置源实现 ConfigSource（name / read），由 SourceRegistry 按名查找；
//! 启动参数中的 key/value 原样转发给配置源。

pub mod file;
pub mod http;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::HostError;
use crate::snapshot::ApplicationConfigSnapshot;

pub use file::FileConfigSource;
pub use http::HttpConfigSource;

/// 转发给配置源的参数
pub type SourceArgs = BTreeMap<String, String>;

/// 加载配置失败
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Missing source argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid source argument {key}: {message}")]
    InvalidArgument { key: &'static str, message: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse {format} document: {message}")]
    Parse { format: DocumentFormat, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// 配置文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    pub fn from_name(name: &str) -> Result<Self, LoadError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            other => Err(LoadError::UnsupportedFormat(other.to_string())),
        }
    }

    /// 解析文档文本为快照
    pub fn parse(self, text: &str) -> Result<ApplicationConfigSnapshot, LoadError> {
        let document: Value = match self {
            Self::Json if text.trim().is_empty() => Value::Null,
            Self::Json => serde_json::from_str(text).map_err(|e| LoadError::Parse {
                format: self,
                message: e.to_string(),
            })?,
            Self::Toml => toml::from_str(text).map_err(|e| LoadError::Parse {
                format: self,
                message: e.to_string(),
            })?,
        };
        ApplicationConfigSnapshot::from_value(document)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Toml => write!(f, "TOML"),
        }
    }
}

/// 查找参数：接受 `key` 与 `--key` 两种写法
pub fn source_arg<'a>(args: &'a SourceArgs, key: &str) -> Option<&'a str> {
    args.get(key)
        .or_else(|| args.get(&format!("--{key}")))
        .map(String::as_str)
}

/// 配置源 trait
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// 唯一名称，如 "file"、"http"
    fn name(&self) -> &str;

    /// 加载完整配置
    async fn read(&self, args: &SourceArgs) -> Result<ApplicationConfigSnapshot, LoadError>;
}

/// 配置源注册表
#[derive(Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn ConfigSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置 file / http 配置源
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FileConfigSource);
        registry.register(HttpConfigSource::new());
        registry
    }

    pub fn register(&mut self, source: impl ConfigSource + 'static) {
        let name = source.name().to_string();
        self.sources.insert(name, Arc::new(source));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ConfigSource>, HostError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::SourceNotFound(name.to_string()))
    }

    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }
}
