//! 配置快照：一次加载得到的完整配置文档
//!
//! 文档根为「Agent 名称 → 配置对象」映射；对象中可选布尔字段 `enabled`（缺省为 true），
//! 其余字段整体作为该 Agent 的 settings，对宿主不透明。快照加载后不可变，按结构相等比较。

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::source::LoadError;

const ENABLED_KEY: &str = "enabled";

/// 单个 Agent 的配置片段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfigEntry {
    name: String,
    enabled: bool,
    settings: Map<String, Value>,
}

impl AgentConfigEntry {
    pub fn new(name: impl Into<String>, enabled: bool, settings: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            enabled,
            settings,
        }
    }

    /// 从文档中的一个对象解析；`enabled` 必须是布尔值
    pub fn from_value(name: &str, value: Value) -> Result<Self, LoadError> {
        let mut settings = match value {
            Value::Object(map) => map,
            other => {
                return Err(LoadError::Malformed(format!(
                    "entry \"{name}\" must be an object, got {other}"
                )))
            }
        };

        let enabled = match settings.remove(ENABLED_KEY) {
            None => true,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(LoadError::Malformed(format!(
                    "\"{name}.enabled\" must be a boolean, got {other}"
                )))
            }
        };

        Ok(Self::new(name, enabled, settings))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// 将 settings 反序列化为 Agent 自己的配置结构
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.settings.clone()))
    }
}

impl fmt::Display for AgentConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(&self.settings).unwrap_or_else(|_| "{}".to_string());
        write!(f, "{{enabled: {}, settings: {}}}", self.enabled, rendered)
    }
}

/// 一次加载的完整配置快照（按名称排序，名称唯一）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationConfigSnapshot {
    agents: BTreeMap<String, AgentConfigEntry>,
}

impl ApplicationConfigSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从通用文档模型解析；`null` 视为空文档
    pub fn from_value(document: Value) -> Result<Self, LoadError> {
        let root = match document {
            Value::Null => return Ok(Self::empty()),
            Value::Object(map) => map,
            other => {
                return Err(LoadError::Malformed(format!(
                    "configuration root must be a mapping of agent names, got {other}"
                )))
            }
        };

        let mut agents = BTreeMap::new();
        for (name, value) in root {
            let entry = AgentConfigEntry::from_value(&name, value)?;
            agents.insert(name, entry);
        }
        Ok(Self { agents })
    }

    pub fn get(&self, name: &str) -> Option<&AgentConfigEntry> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AgentConfigEntry)> {
        self.agents.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl fmt::Display for ApplicationConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.agents.is_empty() {
            return write!(f, "(no agents)");
        }
        for (index, (name, entry)) in self.agents.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "  {name}: {entry}")?;
        }
        Ok(())
    }
}
