use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::error::{AppError, Result};
use crate::state::{CatalogRepository, InMemoryCatalog, PgCatalogRepository};
use std::sync::Arc;

/// Create a catalog repository based on configuration
pub async fn create_repository(config: &DatabaseConfig) -> Result<Arc<dyn CatalogRepository>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            if config.url.is_none() {
                return Err(AppError::Configuration(
                    "Postgres backend requires 'url' configuration".to_string(),
                ));
            }

            tracing::info!(
                max_connections = config.max_connections,
                "Initializing Postgres catalog repository"
            );

            let repository = PgCatalogRepository::connect(config).await?;
            Ok(Arc::new(repository))
        }

        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory catalog; data is not persisted");
            Ok(create_in_memory_repository())
        }
    }
}

/// Create an empty in-memory repository (for testing and development)
pub fn create_in_memory_repository() -> Arc<dyn CatalogRepository> {
    tracing::info!("Initializing in-memory catalog repository");
    Arc::new(InMemoryCatalog::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_repository() {
        let repository = create_in_memory_repository();
        assert_eq!(repository.count_eligible_listings().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_backend_from_config() {
        let config = DatabaseConfig {
            backend: DatabaseBackend::Memory,
            ..Default::default()
        };

        let repository = create_repository(&config).await.unwrap();
        assert!(repository.entity_ids_with_attributes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_postgres_requires_url() {
        let config = DatabaseConfig {
            backend: DatabaseBackend::Postgres,
            url: None,
            ..Default::default()
        };

        let result = create_repository(&config).await;
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }
}
