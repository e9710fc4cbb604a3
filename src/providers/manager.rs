//! Provider registry / 提供者注册表

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::Provider;
use crate::config::AppConfig;
use crate::error::SearchError;
use crate::search::BackendKind;

pub type ProviderBox = Arc<Provider>;

/// Status of one backend / 后端状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub enabled: bool,
    pub default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Provider manager (holds every enabled provider) / 提供者管理器
#[derive(Clone)]
pub struct ProviderManager {
    providers: Arc<RwLock<HashMap<BackendKind, ProviderBox>>>,
    /// Construction failures (kind -> error message) / 构建失败信息
    provider_errors: Arc<RwLock<HashMap<BackendKind, String>>>,
    default_kind: BackendKind,
}

impl ProviderManager {
    pub fn new(default_kind: BackendKind) -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
            provider_errors: Arc::new(RwLock::new(HashMap::new())),
            default_kind,
        }
    }

    /// Build every enabled backend. A backend that fails to build is recorded
    /// and left out; the others still register.
    pub async fn from_config(config: &AppConfig) -> Result<Self, SearchError> {
        let default_kind: BackendKind = config.search.default_provider.parse()?;
        let manager = Self::new(default_kind);

        for kind in BackendKind::ALL {
            if !Self::is_enabled(kind, config) {
                continue;
            }
            match Provider::from_config(kind, config) {
                Ok(provider) => manager.register(provider).await,
                Err(e) => {
                    tracing::error!("Provider creation failed: {} - {}", kind, e);
                    manager.provider_errors.write().await.insert(kind, e.to_string());
                }
            }
        }

        if manager.providers.read().await.is_empty() {
            tracing::warn!("No search providers enabled");
        }
        Ok(manager)
    }

    fn is_enabled(kind: BackendKind, config: &AppConfig) -> bool {
        match kind {
            BackendKind::MySql => config.mysql.enabled,
            BackendKind::Postgres => config.postgres.enabled,
            BackendKind::Elasticsearch => config.elasticsearch.enabled,
        }
    }

    /// Register provider / 注册提供者
    pub async fn register(&self, provider: Provider) {
        let kind = provider.kind();
        self.providers.write().await.insert(kind, Arc::new(provider));
        self.provider_errors.write().await.remove(&kind);
        tracing::info!("Search provider registered: {}", kind);
    }

    pub fn default_kind(&self) -> BackendKind {
        self.default_kind
    }

    /// Resolve a `?provider=` value; blank means the default provider
    pub async fn get(&self, name: Option<&str>) -> Result<ProviderBox, SearchError> {
        let kind = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.parse::<BackendKind>()?,
            None => self.default_kind,
        };

        let providers = self.providers.read().await;
        providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| SearchError::ProviderDisabled(kind.name().to_string()))
    }

    /// Status of every known backend / 所有后端状态
    pub async fn list(&self) -> Vec<ProviderStatus> {
        let providers = self.providers.read().await;
        let errors = self.provider_errors.read().await;
        BackendKind::ALL
            .iter()
            .map(|kind| ProviderStatus {
                name: kind.name().to_string(),
                enabled: providers.contains_key(kind),
                default: *kind == self.default_kind,
                error: errors.get(kind).cloned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.mysql.enabled = true;
        config.postgres.enabled = false;
        config.elasticsearch.enabled = true;
        config
    }

    #[tokio::test]
    async fn test_registers_enabled_providers() {
        let manager = ProviderManager::from_config(&config()).await.unwrap();
        assert_eq!(manager.default_kind(), BackendKind::MySql);

        let p = manager.get(None).await.unwrap();
        assert_eq!(p.kind(), BackendKind::MySql);
        let p = manager.get(Some("ES")).await.unwrap();
        assert_eq!(p.kind(), BackendKind::Elasticsearch);
        let p = manager.get(Some("  ")).await.unwrap();
        assert_eq!(p.kind(), BackendKind::MySql);
    }

    #[tokio::test]
    async fn test_disabled_and_unknown() {
        let manager = ProviderManager::from_config(&config()).await.unwrap();
        assert!(matches!(
            manager.get(Some("postgres")).await,
            Err(SearchError::ProviderDisabled(name)) if name == "Postgres"
        ));
        assert!(matches!(
            manager.get(Some("solr")).await,
            Err(SearchError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_default_provider_is_rejected() {
        let mut config = config();
        config.search.default_provider = "solr".to_string();
        assert!(ProviderManager::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_provider_is_recorded() {
        let mut config = config();
        config.elasticsearch.url = "not a url".to_string();
        let manager = ProviderManager::from_config(&config).await.unwrap();

        let statuses = manager.list().await;
        let es = statuses.iter().find(|s| s.name == "Elasticsearch").unwrap();
        assert!(!es.enabled);
        assert!(es.error.is_some());

        let mysql = statuses.iter().find(|s| s.name == "MySQL").unwrap();
        assert!(mysql.enabled && mysql.default);
        assert!(mysql.error.is_none());
    }
}
