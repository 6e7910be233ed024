//! Runtime that drives a `Session`: effect execution and timers.

mod driver;
mod keepalive;

pub use driver::SessionDriver;
pub use keepalive::KeepAlive;
