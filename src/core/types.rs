//! Quantum primitives: bits, bases, qubits and measurements.
//!
//! The engine tracks qubits at the bit level: a qubit carries the classical
//! value it encodes and the basis it was prepared in. Measuring in the
//! preparation basis recovers the value deterministically; measuring in the
//! other basis collapses to a uniformly random outcome. This is exactly the
//! statistics BB84 relies on, without a full state-vector simulation.

use rand::Rng;
use std::fmt;
use std::ops::BitXor;

use crate::core::errors::QuantumError;

/// A classical bit.
///
/// Closed under XOR, which is the only arithmetic the protocol needs
/// (parity accumulation and error counting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bit {
    Zero,
    One,
}

impl Bit {
    /// Returns the opposite bit value.
    pub fn flip(self) -> Bit {
        match self {
            Bit::Zero => Bit::One,
            Bit::One => Bit::Zero,
        }
    }

    /// The bit as 0 or 1.
    pub fn as_u8(self) -> u8 {
        match self {
            Bit::Zero => 0,
            Bit::One => 1,
        }
    }
}

impl From<bool> for Bit {
    fn from(value: bool) -> Self {
        if value { Bit::One } else { Bit::Zero }
    }
}

impl BitXor for Bit {
    type Output = Bit;

    fn bitxor(self, rhs: Bit) -> Bit {
        Bit::from(self != rhs)
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// The basis a qubit is prepared or measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basis {
    /// Computational basis (Z): |0>, |1>.
    Rectilinear,
    /// Hadamard basis (X): |+>, |->.
    Diagonal,
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Rectilinear => write!(f, "Rectilinear(+)"),
            Basis::Diagonal => write!(f, "Diagonal(x)"),
        }
    }
}

/// A qubit in transit between the two parties.
///
/// `preparation_basis` records Alice's original encoding. The receiver never
/// observes it; the simulator keeps it so measurement can dispatch on
/// whether the bases agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qubit {
    /// The bit value encoded in the qubit.
    pub classical_value: Bit,
    /// The basis used to prepare this qubit.
    pub preparation_basis: Basis,
}

/// The outcome of measuring a single qubit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementResult {
    /// The classical bit obtained from the measurement.
    pub measured_bit: Bit,
    /// The basis the measurement was performed in.
    pub measurement_basis: Basis,
}

/// Encodes a classical bit into a qubit in the given basis.
pub fn prepare_qubit(bit: Bit, basis: Basis) -> Qubit {
    Qubit {
        classical_value: bit,
        preparation_basis: basis,
    }
}

/// Measures a qubit in the given basis.
///
/// A matching basis yields the encoded bit deterministically; a mismatched
/// basis yields a uniformly random bit.
pub fn measure_qubit(qubit: Qubit, measurement_basis: Basis) -> MeasurementResult {
    measure_qubit_with(qubit, measurement_basis, &mut rand::rng())
}

/// [`measure_qubit`] with an explicit randomness source.
pub fn measure_qubit_with<R: Rng + ?Sized>(
    qubit: Qubit,
    measurement_basis: Basis,
    rng: &mut R,
) -> MeasurementResult {
    let mut measured_bit = qubit.classical_value;

    if measurement_basis != qubit.preparation_basis && rng.random_bool(0.5) {
        measured_bit = measured_bit.flip();
    }

    MeasurementResult {
        measured_bit,
        measurement_basis,
    }
}

/// Generates `length` uniform random bits.
pub fn random_bits(length: usize) -> Vec<Bit> {
    random_bits_with(length, &mut rand::rng())
}

/// [`random_bits`] with an explicit randomness source.
pub fn random_bits_with<R: Rng + ?Sized>(length: usize, rng: &mut R) -> Vec<Bit> {
    (0..length).map(|_| Bit::from(rng.random_bool(0.5))).collect()
}

/// Generates `length` uniform random bases.
pub fn random_bases(length: usize) -> Vec<Basis> {
    random_bases_with(length, &mut rand::rng())
}

/// [`random_bases`] with an explicit randomness source.
pub fn random_bases_with<R: Rng + ?Sized>(length: usize, rng: &mut R) -> Vec<Basis> {
    (0..length)
        .map(|_| {
            if rng.random_bool(0.5) {
                Basis::Diagonal
            } else {
                Basis::Rectilinear
            }
        })
        .collect()
}

/// Packs bits into bytes, big-endian within each byte.
///
/// Bit index 0 lands in the most significant bit of byte 0. A partial last
/// byte is padded with zero bits.
pub fn bits_to_bytes(bits: &[Bit]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];

    for (i, bit) in bits.iter().enumerate() {
        if *bit == Bit::One {
            bytes[i / 8] |= 1 << (7 - (i % 8));
        }
    }

    bytes
}

/// Unpacks `bit_length` bits from `bytes`, inverse of [`bits_to_bytes`].
///
/// `bit_length` must not exceed `8 * bytes.len()`.
pub fn bytes_to_bits(bytes: &[u8], bit_length: usize) -> Vec<Bit> {
    (0..bit_length)
        .map(|i| Bit::from(bytes[i / 8] & (1 << (7 - (i % 8))) != 0))
        .collect()
}

/// Fraction of positions at which two bit sequences disagree.
///
/// Empty input has error rate zero.
///
/// # Errors
///
/// `ArgumentMismatch` when the sequences differ in length.
pub fn calculate_bit_error(bits1: &[Bit], bits2: &[Bit]) -> Result<f64, QuantumError> {
    if bits1.len() != bits2.len() {
        return Err(QuantumError::ArgumentMismatch {
            left: bits1.len(),
            right: bits2.len(),
        });
    }

    if bits1.is_empty() {
        return Ok(0.0);
    }

    let errors = bits1.iter().zip(bits2).filter(|(a, b)| a != b).count();

    Ok(errors as f64 / bits1.len() as f64)
}
