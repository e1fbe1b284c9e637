pub mod annotation;
pub mod config;
pub mod control;
pub mod cv;
pub mod error;
pub mod link;
pub mod target;
pub mod wire;
pub mod worker;

pub use link::list_devices;

pub(crate) type Result<T> = std::result::Result<T, crate::error::Error>;
