pub mod channel;
pub mod errors;
pub mod types;

pub use channel::QuantumChannel;
pub use errors::*;
pub use types::{Basis, Bit, MeasurementResult, Qubit};
