use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use super::{
    preference_dto::UpdatePreferencesRequest,
    preference_models::NotificationPreferences,
    preference_repository::PreferenceRepository,
};

#[derive(Clone)]
pub struct PreferenceService {
    repo: Arc<dyn PreferenceRepository>,
}

impl PreferenceService {
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self { repo }
    }

    /// Returns the stored preferences, creating the default record on first read.
    pub async fn get_user_preferences(&self, user_id: Uuid) -> Result<NotificationPreferences> {
        if let Some(prefs) = self.repo.find_by_user(user_id).await? {
            return Ok(prefs);
        }

        tracing::debug!(%user_id, "Creating default notification preferences");
        self.repo
            .create_if_absent(&NotificationPreferences::defaults(user_id))
            .await
    }

    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        update: UpdatePreferencesRequest,
    ) -> Result<NotificationPreferences> {
        let mut prefs = self.get_user_preferences(user_id).await?;
        update.apply_to(&mut prefs)?;
        self.repo.upsert(&prefs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Channel, NotificationType};
    use crate::preference::preference_repository::InMemoryPreferenceRepository;

    #[tokio::test]
    async fn test_get_creates_defaults_lazily() {
        let repo = Arc::new(InMemoryPreferenceRepository::new());
        let service = PreferenceService::new(repo.clone());
        let user_id = Uuid::new_v4();

        assert!(repo.find_by_user(user_id).await.unwrap().is_none());
        let prefs = service.get_user_preferences(user_id).await.unwrap();
        assert!(!prefs.sms_enabled);
        assert!(repo.find_by_user(user_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_merges_with_stored_record() {
        let service = PreferenceService::new(Arc::new(InMemoryPreferenceRepository::new()));
        let user_id = Uuid::new_v4();

        service
            .update_preferences(
                user_id,
                serde_json::from_value(serde_json::json!({ "sms_enabled": true })).unwrap(),
            )
            .await
            .unwrap();
        let prefs = service
            .update_preferences(
                user_id,
                serde_json::from_value(serde_json::json!({
                    "type_settings": { "SECURITY_ALERT": { "SMS": false } }
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        assert!(prefs.sms_enabled);
        assert!(!prefs.type_channel_enabled(NotificationType::SecurityAlert, Channel::Sms));
    }
}
