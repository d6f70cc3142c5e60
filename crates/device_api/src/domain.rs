mod device_provisioning_service;

pub use device_provisioning_service::*;
