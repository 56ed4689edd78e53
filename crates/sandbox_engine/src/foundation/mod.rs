//! Foundation utilities: ownership, teardown ordering, logging, timing

pub mod fatal;
pub mod logging;
pub mod raii;
pub mod teardown;
pub mod time;

pub use raii::{Copyable, NoTeardown, RaiiWrapper, Teardown, Unique};
pub use teardown::{Destroy, TeardownStack};
pub use time::Timer;
