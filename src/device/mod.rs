pub mod client;
pub mod error;
pub mod types;

pub use client::{DeviceApi, HttpDevice};
pub use error::DeviceError;
