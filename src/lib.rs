//! USB codeplug protocol for Hytera radios: frame and request codecs, the
//! payload registry, chunked memory transfers and the session lifecycle.

pub mod cp_device;
pub mod error;
pub mod radio;
pub mod transport;

pub use error::{Error, Result};
pub use radio::{
    config::{ChecksumPolicy, SessionConfig},
    cps_mode::{CpsProfile, OpenMode, StringQuery},
    firmware_mode::FirmwareProfile,
    Radio, SessionState, CODEPLUG_SIZE,
};

#[cfg(test)]
mod tests;
