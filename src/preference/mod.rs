pub mod channel_filter;
pub mod preference_dto;
pub mod preference_handlers;
pub mod preference_models;
pub mod preference_repository;
pub mod preference_resolver;
pub mod preference_service;

pub use channel_filter::filter_channels;
pub use preference_dto::{QuietHoursUpdate, UpdatePreferencesRequest};
pub use preference_handlers::{get_preferences, update_preferences};
pub use preference_models::{NotificationPreferences, QuietHours};
pub use preference_repository::{InMemoryPreferenceRepository, PgPreferenceRepository, PreferenceRepository};
pub use preference_resolver::PreferenceResolver;
pub use preference_service::PreferenceService;
