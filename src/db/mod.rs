pub mod connection;
pub mod readiness;

pub use connection::{DatabaseProbe, SeaOrmProbe};
pub use readiness::{wait_ready, DEFAULT_READY_TIMEOUT};
