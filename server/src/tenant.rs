use tracing::{debug, warn};

use crate::config::DefaultCredentials;
use crate::error::{AppError, AppResult};
use crate::store::LeadStore;
use crate::types::{SendCredentials, TenantChannelConfig};

pub const DEFAULT_TENANT: &str = "default";

/// Maps an inbound phone-number id to the tenant and credentials to reply with.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    defaults: DefaultCredentials,
}

impl TenantResolver {
    pub fn new(defaults: DefaultCredentials) -> Self {
        Self { defaults }
    }

    /// Looks up the tenant row, falling back to the process defaults under
    /// tenant `default`. A failed lookup is logged and treated as "no row".
    /// Fails only when no access token or sending phone-number id is left.
    pub async fn resolve(&self, store: &dyn LeadStore, phone_number_id: Option<&str>) -> AppResult<SendCredentials> {
        let row = match phone_number_id {
            Some(id) => match store.find_tenant_channel(id).await {
                Ok(row) => row,
                Err(err) => {
                    warn!(phone_number_id = id, error = %err, "tenant lookup failed, using default credentials");
                    None
                }
            },
            None => None,
        };
        if row.is_none() {
            debug!(phone_number_id, "no tenant row, single-tenant mode");
        }
        self.pick(row.as_ref(), phone_number_id)
    }

    fn pick(&self, row: Option<&TenantChannelConfig>, phone_number_id: Option<&str>) -> AppResult<SendCredentials> {
        let tenant_id = row
            .map(|r| r.tenant_id.trim())
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_TENANT)
            .to_string();

        let access_token = row
            .and_then(|r| r.access_token.as_deref())
            .filter(|t| !t.trim().is_empty())
            .or(self.defaults.access_token.as_deref())
            .map(str::to_string);
        let graph_version = row
            .and_then(|r| r.graph_version.as_deref())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(self.defaults.graph_version.as_str())
            .to_string();
        let sender = phone_number_id
            .or_else(|| row.map(|r| r.phone_number_id.as_str()))
            .filter(|id| !id.trim().is_empty())
            .or(self.defaults.phone_number_id.as_deref())
            .map(str::to_string);

        match (access_token, sender) {
            (Some(access_token), Some(phone_number_id)) => Ok(SendCredentials {
                tenant_id,
                access_token,
                graph_version,
                phone_number_id,
            }),
            _ => Err(AppError::MissingCredentials { tenant_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn defaults(token: Option<&str>) -> DefaultCredentials {
        DefaultCredentials {
            access_token: token.map(str::to_string),
            graph_version: "v22.0".to_string(),
            phone_number_id: None,
        }
    }

    async fn store_with_tenant() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_channel(TenantChannelConfig {
                tenant_id: "acme".to_string(),
                phone_number_id: "111".to_string(),
                access_token: Some("acme-token".to_string()),
                graph_version: Some("v21.0".to_string()),
            })
            .await;
        store
    }

    #[tokio::test]
    async fn tenant_row_wins() {
        let store = store_with_tenant().await;
        let creds = TenantResolver::new(defaults(Some("env-token")))
            .resolve(&store, Some("111"))
            .await
            .unwrap();
        assert_eq!(creds.tenant_id, "acme");
        assert_eq!(creds.access_token, "acme-token");
        assert_eq!(creds.graph_version, "v21.0");
        assert_eq!(creds.phone_number_id, "111");
    }

    #[tokio::test]
    async fn unknown_number_uses_defaults() {
        let store = store_with_tenant().await;
        let creds = TenantResolver::new(defaults(Some("env-token")))
            .resolve(&store, Some("999"))
            .await
            .unwrap();
        assert_eq!(creds.tenant_id, DEFAULT_TENANT);
        assert_eq!(creds.access_token, "env-token");
        assert_eq!(creds.graph_version, "v22.0");
        assert_eq!(creds.phone_number_id, "999");
    }

    #[tokio::test]
    async fn blank_row_fields_fall_back() {
        let store = MemoryStore::new();
        store
            .insert_channel(TenantChannelConfig {
                tenant_id: "acme".to_string(),
                phone_number_id: "111".to_string(),
                access_token: Some(String::new()),
                graph_version: None,
            })
            .await;
        let creds = TenantResolver::new(defaults(Some("env-token")))
            .resolve(&store, Some("111"))
            .await
            .unwrap();
        assert_eq!(creds.tenant_id, "acme");
        assert_eq!(creds.access_token, "env-token");
        assert_eq!(creds.graph_version, "v22.0");
    }

    #[tokio::test]
    async fn no_credentials_anywhere_is_an_error() {
        let store = MemoryStore::new();
        let err = TenantResolver::new(defaults(None))
            .resolve(&store, Some("999"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingCredentials { ref tenant_id } if tenant_id == DEFAULT_TENANT));
    }

    #[tokio::test]
    async fn missing_sender_id_is_an_error() {
        let store = MemoryStore::new();
        let err = TenantResolver::new(defaults(Some("env-token")))
            .resolve(&store, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MissingCredentials { .. }));
    }

    #[tokio::test]
    async fn lookup_failure_degrades_to_defaults() {
        let store = store_with_tenant().await;
        store.set_unavailable(true);
        let creds = TenantResolver::new(defaults(Some("env-token")))
            .resolve(&store, Some("111"))
            .await
            .unwrap();
        assert_eq!(creds.tenant_id, DEFAULT_TENANT);
        assert_eq!(creds.access_token, "env-token");
    }
}
