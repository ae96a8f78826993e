use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use super::{device_models::Contact, device_repository::DeviceRepository};

/// Resolves a user id to the addresses the external channels deliver to.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn contact(&self, user_id: Uuid) -> Result<Contact>;
}

/// Reads email/phone from `user_contacts` and push tokens from active devices.
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
    devices: Arc<dyn DeviceRepository>,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool, devices: Arc<dyn DeviceRepository>) -> Self {
        Self { pool, devices }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn contact(&self, user_id: Uuid) -> Result<Contact> {
        let row = sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT email, phone FROM user_contacts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        let (email, phone) = row.unwrap_or_default();

        Ok(Contact {
            email,
            phone,
            push_tokens: self.devices.find_active_tokens(user_id).await?,
        })
    }
}

/// Directory for the memory backend. Push tokens come from registered
/// devices; email and phone stay unknown, so EMAIL and SMS fail with
/// `NoContact` unless a contact is seeded.
#[derive(Clone)]
pub struct InMemoryUserDirectory {
    contacts: Arc<DashMap<Uuid, (Option<String>, Option<String>)>>,
    devices: Arc<dyn DeviceRepository>,
}

impl InMemoryUserDirectory {
    pub fn new(devices: Arc<dyn DeviceRepository>) -> Self {
        Self {
            contacts: Arc::new(DashMap::new()),
            devices,
        }
    }

    #[cfg(test)]
    pub fn set_contact(&self, user_id: Uuid, email: Option<&str>, phone: Option<&str>) {
        self.contacts
            .insert(user_id, (email.map(str::to_string), phone.map(str::to_string)));
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn contact(&self, user_id: Uuid) -> Result<Contact> {
        let (email, phone) = self
            .contacts
            .get(&user_id)
            .map(|c| c.clone())
            .unwrap_or_default();

        Ok(Contact {
            email,
            phone,
            push_tokens: self.devices.find_active_tokens(user_id).await?,
        })
    }
}
