use crate::notification::{Channel, NotificationType};

use super::preference_models::NotificationPreferences;

/// Channels worth attempting: globally enabled and enabled for the type.
/// Keeps first-occurrence order and drops duplicates.
pub fn filter_channels(
    requested: &[Channel],
    notification_type: NotificationType,
    prefs: &NotificationPreferences,
) -> Vec<Channel> {
    let mut effective = Vec::with_capacity(requested.len());
    for &channel in requested {
        if effective.contains(&channel) {
            continue;
        }
        if prefs.channel_enabled(channel) && prefs.type_channel_enabled(notification_type, channel) {
            effective.push(channel);
        }
    }
    effective
}
