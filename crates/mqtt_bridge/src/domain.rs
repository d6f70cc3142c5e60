mod authentication_gate;
mod forwarding_mediator;
mod hooks;

pub use authentication_gate::*;
pub use forwarding_mediator::*;
pub use hooks::*;
