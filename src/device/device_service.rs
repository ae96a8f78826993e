use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use super::{
    device_dto::RegisterDeviceRequest,
    device_models::Device,
    device_repository::DeviceRepository,
};

#[derive(Clone)]
pub struct DeviceService {
    repo: Arc<dyn DeviceRepository>,
}

impl DeviceService {
    pub fn new(repo: Arc<dyn DeviceRepository>) -> Self {
        Self { repo }
    }

    pub async fn register_device(&self, user_id: Uuid, payload: RegisterDeviceRequest) -> Result<Device> {
        payload.validate()?;

        let device = self
            .repo
            .upsert(user_id, &payload.token, &payload.device_info)
            .await?;
        tracing::info!(%user_id, device_id = %device.device_id, "Device registered");

        Ok(device)
    }

    pub async fn unregister_device(&self, user_id: Uuid, device_id: &str) -> Result<()> {
        if self.repo.deactivate(user_id, device_id).await? == 0 {
            return Err(AppError::NotFound("Device not found".to_string()));
        }

        tracing::info!(%user_id, device_id, "Device unregistered");
        Ok(())
    }
}
