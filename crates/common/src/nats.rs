mod client;
mod core_publisher;
mod jetstream_publisher;
mod send_gate;
mod trace_context;

pub use client::*;
pub use core_publisher::*;
pub use jetstream_publisher::*;
pub use trace_context::*;
