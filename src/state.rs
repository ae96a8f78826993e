use anyhow::Context;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::channels::{ChannelSender, InAppEvent, InAppSender};
use crate::db::DbPool;
use crate::delivery::{BatchCoordinator, DeliveryPipeline, Dispatcher, SweepConfig, Sweeper};
use crate::device::{
    DeviceRepository, DeviceService, InMemoryDeviceRepository, InMemoryUserDirectory, PgDeviceRepository,
    PgUserDirectory, UserDirectory,
};
use crate::notification::{
    InMemoryNotificationRepository, NotificationRepository, NotificationService, PgNotificationRepository,
};
use crate::preference::{
    InMemoryPreferenceRepository, PgPreferenceRepository, PreferenceRepository, PreferenceResolver,
    PreferenceService,
};

/// Buffered in-app events per SSE subscriber before it starts lagging.
const IN_APP_BUFFER: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub in_app_tx: broadcast::Sender<InAppEvent>,
    pub notification_service: NotificationService,
    pub preference_service: PreferenceService,
    pub device_service: DeviceService,
    pub sweeper: Sweeper,
}

impl AppState {
    /// Wires the engine over `repos`. IN_APP is always registered; `senders`
    /// supplies the external channels that are configured.
    pub fn new(config: &Config, repos: Repositories, senders: Vec<Arc<dyn ChannelSender>>) -> Self {
        let (in_app_tx, _) = broadcast::channel(IN_APP_BUFFER);

        let dispatcher = senders.into_iter().fold(
            Dispatcher::new(repos.directory.clone())
                .with_sender(Arc::new(InAppSender::new(in_app_tx.clone()))),
            |dispatcher, sender| dispatcher.with_sender(sender),
        );

        let pipeline = DeliveryPipeline::new(
            repos.notifications.clone(),
            PreferenceResolver::new(repos.preferences.clone()),
            Arc::new(dispatcher),
        );
        let coordinator = BatchCoordinator::new(
            repos.notifications.clone(),
            pipeline.clone(),
            config.bulk_chunk_size,
            config.lease(),
        );
        let sweeper = Sweeper::new(repos.notifications.clone(), pipeline, config.sweep_config());

        Self {
            notification_service: NotificationService::new(repos.notifications, coordinator, sweeper.clone()),
            preference_service: PreferenceService::new(repos.preferences),
            device_service: DeviceService::new(repos.devices),
            sweeper,
            in_app_tx,
        }
    }
}

/// Storage adapters behind the engine.
#[derive(Clone)]
pub struct Repositories {
    pub notifications: Arc<dyn NotificationRepository>,
    pub preferences: Arc<dyn PreferenceRepository>,
    pub devices: Arc<dyn DeviceRepository>,
    pub directory: Arc<dyn UserDirectory>,
}

impl Repositories {
    pub fn postgres(pool: DbPool) -> Self {
        let devices: Arc<dyn DeviceRepository> = Arc::new(PgDeviceRepository::new(pool.clone()));
        Self {
            notifications: Arc::new(PgNotificationRepository::new(pool.clone())),
            preferences: Arc::new(PgPreferenceRepository::new(pool.clone())),
            directory: Arc::new(PgUserDirectory::new(pool, devices.clone())),
            devices,
        }
    }

    pub fn in_memory() -> Self {
        let devices: Arc<dyn DeviceRepository> = Arc::new(InMemoryDeviceRepository::new());
        Self {
            notifications: Arc::new(InMemoryNotificationRepository::new()),
            preferences: Arc::new(InMemoryPreferenceRepository::new()),
            directory: Arc::new(InMemoryUserDirectory::new(devices.clone())),
            devices,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub sweep_cron: String,
    pub cleanup_cron: String,
    pub sweep_limit: i64,
    pub sweep_concurrency: usize,
    pub sweep_lease_secs: i64,
    pub bulk_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Postgres,
            database_url: None,
            database_max_connections: 5,
            host: "127.0.0.1".to_string(),
            port: 3000,
            sweep_cron: "0 * * * * *".to_string(),
            cleanup_cron: "0 0 * * * *".to_string(),
            sweep_limit: 100,
            sweep_concurrency: 16,
            sweep_lease_secs: 300,
            bulk_chunk_size: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            storage: env_or("STORAGE_BACKEND", defaults.storage)?,
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port)?,
            sweep_cron: std::env::var("SWEEP_CRON").unwrap_or(defaults.sweep_cron),
            cleanup_cron: std::env::var("CLEANUP_CRON").unwrap_or(defaults.cleanup_cron),
            sweep_limit: env_or("SWEEP_LIMIT", defaults.sweep_limit)?,
            sweep_concurrency: env_or("SWEEP_CONCURRENCY", defaults.sweep_concurrency)?,
            sweep_lease_secs: env_or("SWEEP_LEASE_SECS", defaults.sweep_lease_secs)?,
            bulk_chunk_size: env_or("BULK_CHUNK_SIZE", defaults.bulk_chunk_size)?,
        })
    }

    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sweep_lease_secs)
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            limit: self.sweep_limit,
            concurrency: self.sweep_concurrency,
            lease: self.lease(),
        }
    }
}

/// Parses `key` when set, failing with the variable name on a malformed value.
pub(crate) fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!(" Postgres ".parse::<StorageBackend>(), Ok(StorageBackend::Postgres));
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_env_or_reports_bad_numbers() {
        std::env::set_var("NOTIFICATION_ENGINE_TEST_LIMIT", "lots");
        let err = env_or::<i64>("NOTIFICATION_ENGINE_TEST_LIMIT", 100).unwrap_err();
        assert!(err.to_string().contains("NOTIFICATION_ENGINE_TEST_LIMIT"));

        std::env::remove_var("NOTIFICATION_ENGINE_TEST_LIMIT");
        assert_eq!(env_or::<i64>("NOTIFICATION_ENGINE_TEST_LIMIT", 100).unwrap(), 100);
    }

    #[test]
    fn test_sweep_config_from_defaults() {
        let config = Config::default();
        let sweep = config.sweep_config();
        assert_eq!(sweep.limit, 100);
        assert_eq!(sweep.concurrency, 16);
        assert_eq!(sweep.lease, chrono::Duration::minutes(5));
    }
}
