//! Key-distribution protocol drivers.

pub mod bb84;
