//! Selects the configured bus provider.

use std::sync::Arc;

use tracing::info;

use cadence_core::config::BusConfig;
use cadence_core::error::AppError;
use cadence_core::result::AppResult;
use cadence_core::traits::MessageBus;

/// Build the message bus named by `config.provider`.
///
/// `consumer_prefix` identifies this process among the members of a queue
/// group (Redis consumer names are derived from it).
pub async fn connect(config: &BusConfig, consumer_prefix: &str) -> AppResult<Arc<dyn MessageBus>> {
    let bus: Arc<dyn MessageBus> = match config.provider.as_str() {
        #[cfg(feature = "redis-backend")]
        "redis" => {
            info!("Initializing Redis Streams message bus");
            let client = crate::redis::RedisClient::connect(&config.url).await?;
            Arc::new(crate::redis::RedisStreamsBus::new(
                client,
                config.clone(),
                consumer_prefix,
            ))
        }
        #[cfg(feature = "memory")]
        "memory" => {
            info!("Initializing in-memory message bus");
            Arc::new(crate::memory::MemoryBus::new())
        }
        other => {
            return Err(AppError::configuration(format!(
                "Unknown bus provider: '{other}'. Supported: memory, redis"
            )));
        }
    };

    Ok(bus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_provider() {
        let config = BusConfig {
            provider: "memory".to_string(),
            ..BusConfig::default()
        };
        let bus = connect(&config, "test").await.unwrap();
        assert_eq!(bus.bus_type(), "memory");
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let config = BusConfig {
            provider: "nats".to_string(),
            ..BusConfig::default()
        };
        let err = connect(&config, "test").await.unwrap_err();
        assert_eq!(err.kind, cadence_core::error::ErrorKind::Configuration);
    }
}
