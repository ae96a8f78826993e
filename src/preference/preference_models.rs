use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::notification::{Channel, NotificationType};

/// Per-(type, channel) toggles. Missing entries mean enabled.
pub type TypeChannelSettings = BTreeMap<NotificationType, BTreeMap<Channel, bool>>;

pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    pub push_enabled: bool,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub in_app_enabled: bool,
    #[schema(value_type = Object)]
    pub type_settings: Json<TypeChannelSettings>,
    pub quiet_hours_enabled: bool,
    #[schema(value_type = String, example = "22:00:00")]
    pub quiet_hours_start: NaiveTime,
    #[schema(value_type = String, example = "08:00:00")]
    pub quiet_hours_end: NaiveTime,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    /// System defaults: every channel on except SMS, quiet hours off.
    pub fn defaults(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            push_enabled: true,
            email_enabled: true,
            sms_enabled: false,
            in_app_enabled: true,
            type_settings: Json(TypeChannelSettings::new()),
            quiet_hours_enabled: false,
            quiet_hours_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            quiet_hours_end: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Push => self.push_enabled,
            Channel::Email => self.email_enabled,
            Channel::Sms => self.sms_enabled,
            Channel::InApp => self.in_app_enabled,
        }
    }

    pub fn type_channel_enabled(&self, notification_type: NotificationType, channel: Channel) -> bool {
        self.type_settings
            .get(&notification_type)
            .and_then(|channels| channels.get(&channel))
            .copied()
            .unwrap_or(true)
    }

    pub fn quiet_hours(&self) -> QuietHours {
        let timezone = self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(
                user_id = %self.user_id,
                timezone = %self.timezone,
                "Unknown preference timezone, falling back to UTC"
            );
            chrono_tz::UTC
        });

        QuietHours {
            enabled: self.quiet_hours_enabled,
            start: self.quiet_hours_start,
            end: self.quiet_hours_end,
            timezone,
        }
    }
}

/// Quiet-hours window as the scheduler sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub timezone: Tz,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_disable_sms_only() {
        let prefs = NotificationPreferences::defaults(Uuid::new_v4());
        assert!(prefs.channel_enabled(Channel::Push));
        assert!(prefs.channel_enabled(Channel::Email));
        assert!(prefs.channel_enabled(Channel::InApp));
        assert!(!prefs.channel_enabled(Channel::Sms));
        assert!(!prefs.quiet_hours().enabled);
    }

    #[test]
    fn test_unmapped_type_defaults_to_enabled() {
        let mut prefs = NotificationPreferences::defaults(Uuid::new_v4());
        prefs
            .type_settings
            .entry(NotificationType::Promotion)
            .or_default()
            .insert(Channel::Email, false);

        assert!(!prefs.type_channel_enabled(NotificationType::Promotion, Channel::Email));
        assert!(prefs.type_channel_enabled(NotificationType::Promotion, Channel::Push));
        assert!(prefs.type_channel_enabled(NotificationType::SecurityAlert, Channel::Email));
    }

    #[test]
    fn test_bad_timezone_falls_back_to_utc() {
        let mut prefs = NotificationPreferences::defaults(Uuid::new_v4());
        prefs.timezone = "Mars/Olympus_Mons".into();
        assert_eq!(prefs.quiet_hours().timezone, chrono_tz::UTC);

        prefs.timezone = "Asia/Tashkent".into();
        assert_eq!(prefs.quiet_hours().timezone, chrono_tz::Asia::Tashkent);
    }

    #[test]
    fn test_type_settings_serialize_with_wire_names() {
        let mut prefs = NotificationPreferences::defaults(Uuid::new_v4());
        prefs
            .type_settings
            .entry(NotificationType::PriceDrop)
            .or_default()
            .insert(Channel::Sms, true);

        let value = serde_json::to_value(&prefs).unwrap();
        assert_eq!(value["type_settings"]["PRICE_DROP"]["SMS"], true);
    }
}
