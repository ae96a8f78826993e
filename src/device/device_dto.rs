use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct DeviceInfo {
    #[validate(length(min = 1, max = 255))]
    pub device_id: String,
    #[validate(length(max = 50))]
    pub platform: Option<String>,
    #[validate(length(max = 255))]
    pub device_name: Option<String>,
    #[validate(length(max = 50))]
    pub app_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterDeviceRequest {
    #[validate(length(min = 1, max = 4096))]
    pub token: String,
    #[validate(nested)]
    pub device_info: DeviceInfo,
}
