pub mod credentials;
mod device;
mod device_registry;
mod in_memory_device_repository;
mod publisher;
mod result;

pub use device::*;
pub use device_registry::*;
pub use in_memory_device_repository::*;
pub use publisher::*;
pub use result::*;
