#![forbid(unsafe_code)]

pub mod error;
pub mod integrity;
pub mod model;
pub mod selector;
pub mod time;
pub mod timer;

pub use error::Error;
pub use time::Clock;
