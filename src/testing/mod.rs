//! Test doubles for running the proactor without a broker

pub mod mocks;

pub use mocks::*;
