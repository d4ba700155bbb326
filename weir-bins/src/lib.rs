//! Shared setup code for the weir binaries.

pub mod common;
