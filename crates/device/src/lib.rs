//! `device` crate — the device-capability interface and its test double.
//!
//! Every device backend (Appium, adb-based, emulator, …) must implement
//! [`DeviceDriver`]. The engine crate dispatches all screen interaction
//! through this trait object and never talks to a device directly.

pub mod error;
pub mod mock;
pub mod traits;

pub use error::DriverError;
pub use traits::{
    DeviceDriver, DeviceProvider, ImageMatch, OcrMatch, OcrQuery, Selector, SelectorKind,
    TextMatch,
};
