pub mod device_dto;
pub mod device_handlers;
pub mod device_models;
pub mod device_repository;
pub mod device_service;
pub mod directory;

pub use device_dto::{DeviceInfo, RegisterDeviceRequest};
pub use device_handlers::{register_device, unregister_device};
pub use device_models::{Contact, Device};
pub use device_repository::{DeviceRepository, InMemoryDeviceRepository, PgDeviceRepository};
pub use device_service::DeviceService;
pub use directory::{InMemoryUserDirectory, PgUserDirectory, UserDirectory};
