mod client;
mod device_repository;

pub use client::*;
pub use device_repository::*;
