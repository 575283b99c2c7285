pub mod client;
pub mod driver;
pub mod forwarder;
pub mod handle;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::SessionClient;
pub use driver::DriverClient;
pub use forwarder::EventForwarder;
pub use handle::SessionHandle;
