use num_enum::TryFromPrimitive;

#[cfg(test)]
use proptest_derive::Arbitrary;

mod codeplug_request;
mod open_mode;
mod string;

pub use self::{codeplug_request::*, open_mode::*, string::*};

pub const ENTER_PROG_MODE: u16 = 0x01c5;
pub const LEAVE_PROG_MODE: u16 = 0x01c6;
pub const READ_CODEPLUG: u16 = 0x01c7;
pub const WRITE_CODEPLUG: u16 = 0x01c8;
pub const GET_VERSION: u16 = 0x0201;
pub const GET_RADIO_ID: u16 = 0x0203;

/// Selector values seen in captured string requests.
pub const SELECTOR_RADIO_ID: u8 = 0x00;
pub const SELECTOR_UNKNOWN_1: u8 = 0x12;
pub const SELECTOR_UNKNOWN_2: u8 = 0x09;

#[derive(Debug, PartialEq, Eq, TryFromPrimitive, Clone, Copy)]
#[repr(u16)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum StringQuery {
    Version = 0x0201,
    RadioId = 0x0203,
}

#[derive(Debug, PartialEq, Eq, TryFromPrimitive, Clone, Copy)]
#[repr(u8)]
#[cfg_attr(test, derive(Arbitrary))]
pub enum OpenMode {
    Read = 0x00,
    Write = 0x02,
}
