use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use utoipa::ToSchema;

use super::preference_models::{NotificationPreferences, TypeChannelSettings};
use crate::error::{AppError, Result};

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdatePreferencesRequest {
    pub push_enabled: Option<bool>,
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub in_app_enabled: Option<bool>,
    /// Merged entry by entry into the stored matrix
    #[schema(value_type = Option<Object>)]
    pub type_settings: Option<TypeChannelSettings>,
    pub quiet_hours: Option<QuietHoursUpdate>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct QuietHoursUpdate {
    pub enabled: Option<bool>,
    /// "HH:MM" in the preference timezone
    pub start: Option<String>,
    pub end: Option<String>,
    /// IANA timezone name
    pub timezone: Option<String>,
}

fn parse_time_of_day(field: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AppError::Validation(format!("{} must be a time of day (HH:MM), got '{}'", field, value)))
}

impl UpdatePreferencesRequest {
    /// Validates and merges the update into `prefs`.
    pub fn apply_to(self, prefs: &mut NotificationPreferences) -> Result<()> {
        // Validate everything before touching the record.
        let quiet_hours = match self.quiet_hours {
            Some(q) => {
                let start = q.start.as_deref().map(|s| parse_time_of_day("quiet_hours.start", s)).transpose()?;
                let end = q.end.as_deref().map(|s| parse_time_of_day("quiet_hours.end", s)).transpose()?;
                if let Some(tz) = q.timezone.as_deref() {
                    tz.parse::<Tz>()
                        .map_err(|_| AppError::Validation(format!("'{}' is not a valid IANA timezone", tz)))?;
                }
                Some((q.enabled, start, end, q.timezone))
            }
            None => None,
        };

        if let Some(v) = self.push_enabled {
            prefs.push_enabled = v;
        }
        if let Some(v) = self.email_enabled {
            prefs.email_enabled = v;
        }
        if let Some(v) = self.sms_enabled {
            prefs.sms_enabled = v;
        }
        if let Some(v) = self.in_app_enabled {
            prefs.in_app_enabled = v;
        }
        if let Some(settings) = self.type_settings {
            for (notification_type, channels) in settings {
                prefs
                    .type_settings
                    .entry(notification_type)
                    .or_default()
                    .extend(channels);
            }
        }
        if let Some((enabled, start, end, timezone)) = quiet_hours {
            if let Some(v) = enabled {
                prefs.quiet_hours_enabled = v;
            }
            if let Some(v) = start {
                prefs.quiet_hours_start = v;
            }
            if let Some(v) = end {
                prefs.quiet_hours_end = v;
            }
            if let Some(v) = timezone {
                prefs.timezone = v;
            }
        }
        prefs.updated_at = Utc::now();

        Ok(())
    }
}
