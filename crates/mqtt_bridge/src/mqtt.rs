mod codec;
mod listener;
mod session;

pub use codec::*;
pub use listener::*;
pub use session::*;
