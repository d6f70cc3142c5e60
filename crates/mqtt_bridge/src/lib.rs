pub mod domain;
pub mod mqtt;
pub mod mqtt_bridge;

pub use domain::*;
pub use mqtt::*;
pub use mqtt_bridge::*;
