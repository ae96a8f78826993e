use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::{device_dto::DeviceInfo, device_models::Device};

const DEVICE_COLUMNS: &str = "id, user_id, device_id, push_token, platform, device_name, app_version, \
    is_active, last_seen_at, created_at, updated_at";

#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Inserts or refreshes the registration for (user, device) and reactivates it.
    async fn upsert(&self, user_id: Uuid, token: &str, info: &DeviceInfo) -> Result<Device>;

    async fn deactivate(&self, user_id: Uuid, device_id: &str) -> Result<u64>;

    async fn find_active_tokens(&self, user_id: Uuid) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct PgDeviceRepository {
    pool: PgPool,
}

impl PgDeviceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRepository for PgDeviceRepository {
    async fn upsert(&self, user_id: Uuid, token: &str, info: &DeviceInfo) -> Result<Device> {
        let query = format!(
            "INSERT INTO user_devices (id, user_id, device_id, push_token, platform, device_name, app_version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, device_id) DO UPDATE SET \
                push_token = EXCLUDED.push_token, \
                platform = COALESCE(EXCLUDED.platform, user_devices.platform), \
                device_name = COALESCE(EXCLUDED.device_name, user_devices.device_name), \
                app_version = COALESCE(EXCLUDED.app_version, user_devices.app_version), \
                is_active = true, \
                last_seen_at = NOW(), \
                updated_at = NOW() \
             RETURNING {DEVICE_COLUMNS}"
        );
        let device = sqlx::query_as::<_, Device>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&info.device_id)
            .bind(token)
            .bind(&info.platform)
            .bind(&info.device_name)
            .bind(&info.app_version)
            .fetch_one(&self.pool)
            .await?;

        Ok(device)
    }

    async fn deactivate(&self, user_id: Uuid, device_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE user_devices SET is_active = false, updated_at = NOW() \
             WHERE user_id = $1 AND device_id = $2",
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_active_tokens(&self, user_id: Uuid) -> Result<Vec<String>> {
        let tokens = sqlx::query_scalar::<_, String>(
            "SELECT push_token FROM user_devices \
             WHERE user_id = $1 AND is_active = true \
             ORDER BY last_seen_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryDeviceRepository {
    devices: Arc<DashMap<(Uuid, String), Device>>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn upsert(&self, user_id: Uuid, token: &str, info: &DeviceInfo) -> Result<Device> {
        let now = Utc::now();
        let mut entry = self
            .devices
            .entry((user_id, info.device_id.clone()))
            .or_insert_with(|| Device {
                id: Uuid::new_v4(),
                user_id,
                device_id: info.device_id.clone(),
                push_token: token.to_string(),
                platform: None,
                device_name: None,
                app_version: None,
                is_active: true,
                last_seen_at: now,
                created_at: now,
                updated_at: now,
            });

        entry.push_token = token.to_string();
        if info.platform.is_some() {
            entry.platform = info.platform.clone();
        }
        if info.device_name.is_some() {
            entry.device_name = info.device_name.clone();
        }
        if info.app_version.is_some() {
            entry.app_version = info.app_version.clone();
        }
        entry.is_active = true;
        entry.last_seen_at = now;
        entry.updated_at = now;

        Ok(entry.clone())
    }

    async fn deactivate(&self, user_id: Uuid, device_id: &str) -> Result<u64> {
        match self.devices.get_mut(&(user_id, device_id.to_string())) {
            Some(mut device) => {
                device.is_active = false;
                device.updated_at = Utc::now();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn find_active_tokens(&self, user_id: Uuid) -> Result<Vec<String>> {
        let mut active: Vec<(chrono::DateTime<Utc>, String)> = self
            .devices
            .iter()
            .filter(|d| d.user_id == user_id && d.is_active)
            .map(|d| (d.last_seen_at, d.push_token.clone()))
            .collect();
        active.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(active.into_iter().map(|(_, token)| token).collect())
    }
}
