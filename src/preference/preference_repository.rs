use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::preference_models::NotificationPreferences;

/// Column list for `notification_preferences` queries.
const PREFERENCE_COLUMNS: &str = "user_id, push_enabled, email_enabled, sms_enabled, in_app_enabled, \
    type_settings, quiet_hours_enabled, quiet_hours_start, quiet_hours_end, timezone, created_at, updated_at";

#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<NotificationPreferences>>;

    /// Inserts the first record for a user or keeps the existing one.
    async fn create_if_absent(&self, prefs: &NotificationPreferences) -> Result<NotificationPreferences>;

    async fn upsert(&self, prefs: &NotificationPreferences) -> Result<NotificationPreferences>;
}

#[derive(Clone)]
pub struct PgPreferenceRepository {
    pool: PgPool,
}

impl PgPreferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferenceRepository for PgPreferenceRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<NotificationPreferences>> {
        let query = format!("SELECT {PREFERENCE_COLUMNS} FROM notification_preferences WHERE user_id = $1");
        let prefs = sqlx::query_as::<_, NotificationPreferences>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(prefs)
    }

    async fn create_if_absent(&self, prefs: &NotificationPreferences) -> Result<NotificationPreferences> {
        // The no-op DO UPDATE makes RETURNING yield the existing row on conflict.
        let query = format!(
            "INSERT INTO notification_preferences \
                (user_id, push_enabled, email_enabled, sms_enabled, in_app_enabled, type_settings, \
                 quiet_hours_enabled, quiet_hours_start, quiet_hours_end, timezone) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING {PREFERENCE_COLUMNS}"
        );
        let prefs = sqlx::query_as::<_, NotificationPreferences>(&query)
            .bind(prefs.user_id)
            .bind(prefs.push_enabled)
            .bind(prefs.email_enabled)
            .bind(prefs.sms_enabled)
            .bind(prefs.in_app_enabled)
            .bind(&prefs.type_settings)
            .bind(prefs.quiet_hours_enabled)
            .bind(prefs.quiet_hours_start)
            .bind(prefs.quiet_hours_end)
            .bind(&prefs.timezone)
            .fetch_one(&self.pool)
            .await?;

        Ok(prefs)
    }

    async fn upsert(&self, prefs: &NotificationPreferences) -> Result<NotificationPreferences> {
        let query = format!(
            "INSERT INTO notification_preferences \
                (user_id, push_enabled, email_enabled, sms_enabled, in_app_enabled, type_settings, \
                 quiet_hours_enabled, quiet_hours_start, quiet_hours_end, timezone) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (user_id) DO UPDATE SET \
                push_enabled = EXCLUDED.push_enabled, \
                email_enabled = EXCLUDED.email_enabled, \
                sms_enabled = EXCLUDED.sms_enabled, \
                in_app_enabled = EXCLUDED.in_app_enabled, \
                type_settings = EXCLUDED.type_settings, \
                quiet_hours_enabled = EXCLUDED.quiet_hours_enabled, \
                quiet_hours_start = EXCLUDED.quiet_hours_start, \
                quiet_hours_end = EXCLUDED.quiet_hours_end, \
                timezone = EXCLUDED.timezone, \
                updated_at = NOW() \
             RETURNING {PREFERENCE_COLUMNS}"
        );
        let prefs = sqlx::query_as::<_, NotificationPreferences>(&query)
            .bind(prefs.user_id)
            .bind(prefs.push_enabled)
            .bind(prefs.email_enabled)
            .bind(prefs.sms_enabled)
            .bind(prefs.in_app_enabled)
            .bind(&prefs.type_settings)
            .bind(prefs.quiet_hours_enabled)
            .bind(prefs.quiet_hours_start)
            .bind(prefs.quiet_hours_end)
            .bind(&prefs.timezone)
            .fetch_one(&self.pool)
            .await?;

        Ok(prefs)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPreferenceRepository {
    preferences: Arc<DashMap<Uuid, NotificationPreferences>>,
}

impl InMemoryPreferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryPreferenceRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<NotificationPreferences>> {
        Ok(self.preferences.get(&user_id).map(|p| p.clone()))
    }

    async fn create_if_absent(&self, prefs: &NotificationPreferences) -> Result<NotificationPreferences> {
        Ok(self
            .preferences
            .entry(prefs.user_id)
            .or_insert_with(|| prefs.clone())
            .clone())
    }

    async fn upsert(&self, prefs: &NotificationPreferences) -> Result<NotificationPreferences> {
        let mut entry = self
            .preferences
            .entry(prefs.user_id)
            .or_insert_with(|| prefs.clone());
        let created_at = entry.created_at;
        *entry = prefs.clone();
        entry.created_at = created_at;
        Ok(entry.clone())
    }
}
