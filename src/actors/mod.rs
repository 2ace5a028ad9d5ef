//! Derived actors built on the proactor hook contract

pub mod atn;

pub use atn::{Atn, AtnCommand, AtnData, AtnPayload, AtnSettings, AtnView, RelayState};
