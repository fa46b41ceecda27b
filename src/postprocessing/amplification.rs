//! Privacy amplification via universal hashing.
//!
//! Compresses a partially leaked key into a shorter one about which an
//! eavesdropper's information is negligible. The leftover hash lemma
//! bounds how much output length survives: the input length minus the
//! leaked bits minus a security parameter.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use sha3::{Sha3_256, Sha3_512};
use std::fmt;

use crate::core::errors::AmplifyError;
use crate::core::types::{self, Bit};

/// Bits of slack subtracted from the leftover-hash-lemma bound.
pub const DEFAULT_SECURITY_PARAMETER: usize = 64;

/// Mersenne prime 2^61 - 1, the modulus of the 2-universal family.
const MERSENNE_61: u64 = 2_305_843_009_213_693_951;

/// Hash family used for key compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AmplificationMethod {
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-512")]
    Sha512,
    /// Default: composes trivially with arbitrary target lengths.
    #[default]
    #[serde(rename = "SHA3-256")]
    Sha3_256,
    #[serde(rename = "SHA3-512")]
    Sha3_512,
    /// `h(x) = (a·x + b) mod p` over 8-byte chunks. Theoretically tight
    /// for privacy amplification but fixed-width, so the SHA3 expansion
    /// is preferred.
    #[serde(rename = "2-universal")]
    TwoUniversal,
}

impl fmt::Display for AmplificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmplificationMethod::Sha256 => write!(f, "SHA-256"),
            AmplificationMethod::Sha512 => write!(f, "SHA-512"),
            AmplificationMethod::Sha3_256 => write!(f, "SHA3-256"),
            AmplificationMethod::Sha3_512 => write!(f, "SHA3-512"),
            AmplificationMethod::TwoUniversal => write!(f, "2-universal"),
        }
    }
}

/// Privacy amplifier configured with a hash family.
///
/// Amplification is a pure function of its inputs and configuration:
/// identical keys, leakage, target and seeds produce identical output.
#[derive(Debug, Clone)]
pub struct PrivacyAmplifier {
    method: AmplificationMethod,
    security_parameter: usize,
    seeds: (u64, u64),
}

impl PrivacyAmplifier {
    /// Creates an amplifier using the given hash family.
    pub fn new(method: AmplificationMethod) -> Self {
        Self {
            method,
            security_parameter: DEFAULT_SECURITY_PARAMETER,
            seeds: (0x9e37_79b9_7f4a_7c15, 0x6a09_e667_f3bc_c908),
        }
    }

    /// Overrides the security parameter (floored at 1 bit).
    pub fn with_security_parameter(mut self, bits: usize) -> Self {
        self.security_parameter = bits.max(1);
        self
    }

    /// Sets the seeds of the 2-universal family.
    pub fn with_seeds(mut self, a: u64, b: u64) -> Self {
        self.seeds = (a, b);
        self
    }

    pub fn method(&self) -> AmplificationMethod {
        self.method
    }

    /// Compresses `key` to `target_length` bits.
    ///
    /// `information_leakage` is the fraction of `key` assumed known to an
    /// eavesdropper (QBER sample plus reconciliation parities).
    ///
    /// # Errors
    ///
    /// `InsufficientSecurity` when the leftover-hash-lemma bound
    /// `len - leaked - security_parameter` falls below `target_length`;
    /// `EmptyKey` / `InvalidTargetLength` on degenerate input.
    pub fn amplify(
        &self,
        key: &[Bit],
        information_leakage: f64,
        target_length: usize,
    ) -> Result<Vec<u8>, AmplifyError> {
        if key.is_empty() {
            return Err(AmplifyError::EmptyKey);
        }
        if target_length == 0 {
            return Err(AmplifyError::InvalidTargetLength);
        }

        let leaked_bits = (information_leakage * key.len() as f64) as usize;
        let max_secure =
            key.len() as i64 - leaked_bits as i64 - self.security_parameter as i64;

        if max_secure < target_length as i64 {
            return Err(AmplifyError::InsufficientSecurity {
                target: target_length,
                max_secure,
            });
        }

        match self.method {
            AmplificationMethod::TwoUniversal => {
                let (a, b) = self.seeds;
                self.amplify_with_universal_hash(key, a, b, target_length)
            }
            method => Ok(expand_with_hash(method, &types::bits_to_bytes(key), target_length)),
        }
    }

    /// Amplifies with the 2-universal family directly.
    ///
    /// Processes the packed key in 8-byte little-endian chunks and emits
    /// 8 hashed bytes per chunk, truncated to the target byte length.
    /// No secure-length gate is applied here; [`amplify`](Self::amplify)
    /// is the gated entry point.
    pub fn amplify_with_universal_hash(
        &self,
        key: &[Bit],
        seed1: u64,
        seed2: u64,
        target_length: usize,
    ) -> Result<Vec<u8>, AmplifyError> {
        if key.is_empty() {
            return Err(AmplifyError::EmptyKey);
        }

        let hasher = TwoUniversalHash::new(seed1, seed2);
        let key_bytes = types::bits_to_bytes(key);

        let mut result = Vec::with_capacity(key_bytes.len().div_ceil(8) * 8);
        for chunk in key_bytes.chunks(8) {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);

            let hashed = hasher.hash(u64::from_le_bytes(word));
            result.extend_from_slice(&hashed.to_le_bytes());
        }

        result.truncate(target_length.div_ceil(8));
        Ok(result)
    }
}

/// Counter-mode hash expansion: emits `H(key ‖ counter)` blocks until the
/// target byte length is reached, then truncates exactly.
fn expand_with_hash(
    method: AmplificationMethod,
    key_bytes: &[u8],
    target_length: usize,
) -> Vec<u8> {
    let target_bytes = target_length.div_ceil(8);
    let mut output = Vec::with_capacity(target_bytes + 64);
    let mut counter = 0u64;

    while output.len() < target_bytes {
        let tag = counter.to_string();
        let block: Vec<u8> = match method {
            AmplificationMethod::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(key_bytes);
                hasher.update(tag.as_bytes());
                hasher.finalize().to_vec()
            }
            AmplificationMethod::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(key_bytes);
                hasher.update(tag.as_bytes());
                hasher.finalize().to_vec()
            }
            AmplificationMethod::Sha3_256 => {
                let mut hasher = Sha3_256::new();
                hasher.update(key_bytes);
                hasher.update(tag.as_bytes());
                hasher.finalize().to_vec()
            }
            AmplificationMethod::Sha3_512 => {
                let mut hasher = Sha3_512::new();
                hasher.update(key_bytes);
                hasher.update(tag.as_bytes());
                hasher.finalize().to_vec()
            }
            AmplificationMethod::TwoUniversal => {
                unreachable!("two-universal amplification does not hash-expand")
            }
        };

        output.extend_from_slice(&block);
        counter += 1;
    }

    output.truncate(target_bytes);
    output
}

/// The 2-universal family `h_{a,b}(x) = (a·x + b) mod p`, `p = 2^61 - 1`.
#[derive(Debug, Clone, Copy)]
pub struct TwoUniversalHash {
    a: u64,
    b: u64,
}

impl TwoUniversalHash {
    pub fn new(seed1: u64, seed2: u64) -> Self {
        Self {
            a: seed1 % MERSENNE_61,
            b: seed2 % MERSENNE_61,
        }
    }

    /// Hashes one 64-bit chunk. The product runs in 128-bit arithmetic so
    /// the reduction is exact.
    pub fn hash(&self, x: u64) -> u64 {
        let wide = u128::from(self.a) * u128::from(x) + u128::from(self.b);
        (wide % u128::from(MERSENNE_61)) as u64
    }
}

/// Maximum secure key length after amplification, per the leftover hash
/// lemma: `L - ⌊H₂(qber)·L⌋ - disclosed - security_parameter`, clipped at
/// zero.
pub fn calculate_secure_key_length(
    raw_key_length: usize,
    qber: f64,
    disclosed_bits: usize,
    security_parameter: usize,
) -> usize {
    let shannon_leakage = (binary_entropy(qber) * raw_key_length as f64) as usize;

    let secure = raw_key_length as i64
        - shannon_leakage as i64
        - disclosed_bits as i64
        - security_parameter as i64;

    secure.max(0) as usize
}

/// Binary entropy `H₂(p) = -p·log₂(p) - (1-p)·log₂(1-p)`, with
/// `H₂(0) = H₂(1) = 0`.
pub fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
}
