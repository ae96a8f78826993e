use std::sync::Arc;
use uuid::Uuid;

use super::preference_models::NotificationPreferences;
use super::preference_repository::PreferenceRepository;

/// Read-only preference lookup for the send path.
#[derive(Clone)]
pub struct PreferenceResolver {
    repo: Arc<dyn PreferenceRepository>,
}

impl PreferenceResolver {
    pub fn new(repo: Arc<dyn PreferenceRepository>) -> Self {
        Self { repo }
    }

    /// Never fails: a missing record or a lookup error yields the defaults.
    pub async fn resolve(&self, user_id: Uuid) -> NotificationPreferences {
        match self.repo.find_by_user(user_id).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => NotificationPreferences::defaults(user_id),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "Preference lookup failed, using defaults");
                NotificationPreferences::defaults(user_id)
            }
        }
    }
}
