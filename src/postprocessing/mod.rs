//! Classical post-processing: error reconciliation and privacy
//! amplification.

pub mod amplification;
pub mod cascade;
