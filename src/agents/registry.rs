//! Agent 注册表
//!
//! 启动时遍历静态的 AgentProvider 列表（名称 + 工厂函数）一次性构建，进程生命周期内只读。

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::{Agent, LetterPrinterAgent, NumberPrinterAgent};
use crate::core::HostError;

/// 一个可发现的 Agent 提供者：名称与构造函数
#[derive(Clone, Copy)]
pub struct AgentProvider {
    pub name: &'static str,
    pub factory: fn() -> Arc<dyn Agent>,
}

impl AgentProvider {
    pub const fn new(name: &'static str, factory: fn() -> Arc<dyn Agent>) -> Self {
        Self { name, factory }
    }
}

/// 随二进制一起链接的内置 Agent
pub fn builtin_providers() -> Vec<AgentProvider> {
    vec![
        AgentProvider::new(LetterPrinterAgent::NAME, || Arc::new(LetterPrinterAgent::new())),
        AgentProvider::new(NumberPrinterAgent::NAME, || Arc::new(NumberPrinterAgent::new())),
    ]
}

/// 名称 → Agent 实例
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按提供者列表构建；重名的提供者只保留第一个
    pub fn discover(providers: &[AgentProvider]) -> Self {
        tracing::info!("Loading agents...");

        let mut registry = Self::new();
        for provider in providers {
            if let Err(e) = registry.register(provider.name, (provider.factory)()) {
                tracing::warn!(provider = provider.name, "Skipping agent provider: {}", e);
            }
        }

        tracing::info!("Loaded agents: {}", registry.names().join(", "));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Result<(), HostError> {
        let name = name.into();
        if self.agents.contains_key(&name) {
            return Err(HostError::DuplicateAgent(name));
        }
        self.agents.insert(name, agent);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    /// 已注册名称（排序）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_discovery() {
        let registry = AgentRegistry::discover(&builtin_providers());
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.names(),
            vec!["LetterPrinterAgent".to_string(), "NumberPrinterAgent".to_string()]
        );
        assert_eq!(
            registry.get("LetterPrinterAgent").unwrap().name(),
            "LetterPrinterAgent"
        );
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = AgentRegistry::new();
        registry
            .register("LetterPrinterAgent", Arc::new(LetterPrinterAgent::new()))
            .unwrap();
        let err = registry
            .register("LetterPrinterAgent", Arc::new(LetterPrinterAgent::new()))
            .unwrap_err();
        assert!(matches!(err, HostError::DuplicateAgent(name) if name == "LetterPrinterAgent"));
    }

    #[test]
    fn test_discover_keeps_first_duplicate() {
        let providers = [
            AgentProvider::new("Printer", || Arc::new(LetterPrinterAgent::new())),
            AgentProvider::new("Printer", || Arc::new(NumberPrinterAgent::new())),
        ];
        let registry = AgentRegistry::discover(&providers);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("Printer").unwrap().name(), "LetterPrinterAgent");
    }
}
