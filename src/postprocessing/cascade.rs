//! Cascade interactive error reconciliation.
//!
//! Alice's key is the reference; a working copy of Bob's is corrected over
//! a fixed number of passes. Each pass partitions the key into contiguous
//! blocks, compares block parities over the public channel and
//! binary-searches any odd-parity block down to a single flipped bit. The
//! block size doubles between passes.
//!
//! Every parity comparison leaks one bit to an eavesdropper. The total is
//! tracked in the returned report so privacy amplification can discount
//! it. A block holding an even number of errors passes its parity check,
//! so residual errors are possible; callers must run a final equality
//! check before trusting the corrected key.

use crate::core::errors::ReconcileError;
use crate::core::types::Bit;

/// Number of correction passes. The block size doubles after each pass.
pub const CASCADE_PASSES: usize = 4;

/// Block-size heuristic: the initial block covers `0.73 / e` bits for an
/// estimated error rate `e`, so a block holds roughly one error.
const BLOCK_SIZE_FACTOR: f64 = 0.73;

/// XOR parity of a bit sequence. Empty input has parity zero.
pub fn calculate_parity(bits: &[Bit]) -> Bit {
    bits.iter().fold(Bit::Zero, |parity, &bit| parity ^ bit)
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone)]
pub struct CascadeReport {
    /// Bob's key after correction.
    pub corrected_key: Vec<Bit>,
    /// Total parity bits disclosed over the public channel.
    pub disclosed_bits: usize,
}

/// Multi-pass Cascade corrector.
#[derive(Debug, Clone)]
pub struct CascadeCorrector {
    passes: usize,
    initial_block_size: usize,
}

impl CascadeCorrector {
    /// Creates a corrector tuned for the estimated error rate.
    pub fn new(error_rate: f64) -> Self {
        let initial_block_size = if error_rate > 0.0 {
            ((BLOCK_SIZE_FACTOR / error_rate) as usize).max(1)
        } else {
            1
        };

        Self {
            passes: CASCADE_PASSES,
            initial_block_size,
        }
    }

    pub fn initial_block_size(&self) -> usize {
        self.initial_block_size
    }

    /// Corrects Bob's key against Alice's reference.
    ///
    /// # Errors
    ///
    /// `KeyLengthMismatch` when the keys differ in length.
    pub fn correct(
        &self,
        alice_key: &[Bit],
        bob_key: &[Bit],
    ) -> Result<CascadeReport, ReconcileError> {
        if alice_key.len() != bob_key.len() {
            return Err(ReconcileError::KeyLengthMismatch {
                alice: alice_key.len(),
                bob: bob_key.len(),
            });
        }

        let key_length = alice_key.len();
        let mut corrected = bob_key.to_vec();
        let mut disclosed_bits = 0usize;
        let mut block_size = self.initial_block_size;

        for _ in 0..self.passes {
            let mut start = 0;
            while start < key_length {
                let end = (start + block_size).min(key_length);

                let alice_parity = calculate_parity(&alice_key[start..end]);
                let bob_parity = calculate_parity(&corrected[start..end]);
                disclosed_bits += 1;

                if alice_parity != bob_parity {
                    // Odd number of errors in this block; locate one.
                    let (error_index, disclosed) =
                        binary_search(alice_key, &corrected, start, end);
                    disclosed_bits += disclosed;
                    corrected[error_index] = corrected[error_index].flip();
                }

                start = end;
            }

            block_size *= 2;
        }

        Ok(CascadeReport {
            corrected_key: corrected,
            disclosed_bits,
        })
    }
}

/// Bisects `[start, end)`, comparing left-half parities, until a single
/// position remains. Returns that position and the parities disclosed.
fn binary_search(
    alice_key: &[Bit],
    bob_key: &[Bit],
    mut start: usize,
    mut end: usize,
) -> (usize, usize) {
    let mut disclosed = 0;

    while start < end - 1 {
        let mid = (start + end) / 2;
        disclosed += 1;

        if calculate_parity(&alice_key[start..mid]) != calculate_parity(&bob_key[start..mid]) {
            end = mid;
        } else {
            start = mid;
        }
    }

    (start, disclosed)
}

/// Single-pass parity corrector for small inputs.
///
/// Corrects a one-bit block directly from Alice's reference when its
/// parity differs; larger blocks only get their first mismatch fixed. The
/// leakage accounting is not tight enough for production use; the
/// Cascade corrector is the real protocol. Kept for test scaffolding.
#[derive(Debug, Clone)]
pub struct SimpleParityCorrector {
    block_size: usize,
}

impl SimpleParityCorrector {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    /// Corrects Bob's key against Alice's reference in one pass.
    ///
    /// # Errors
    ///
    /// `KeyLengthMismatch` when the keys differ in length.
    pub fn correct(
        &self,
        alice_key: &[Bit],
        bob_key: &[Bit],
    ) -> Result<CascadeReport, ReconcileError> {
        if alice_key.len() != bob_key.len() {
            return Err(ReconcileError::KeyLengthMismatch {
                alice: alice_key.len(),
                bob: bob_key.len(),
            });
        }

        let mut corrected = bob_key.to_vec();
        let mut disclosed_bits = 0usize;

        let mut start = 0;
        while start < alice_key.len() {
            let end = (start + self.block_size).min(alice_key.len());
            disclosed_bits += 1;

            if calculate_parity(&alice_key[start..end]) != calculate_parity(&corrected[start..end])
            {
                if end - start == 1 {
                    corrected[start] = alice_key[start];
                } else {
                    // Fix the first mismatch only.
                    for i in start..end {
                        if alice_key[i] != corrected[i] {
                            corrected[i] = alice_key[i];
                            break;
                        }
                    }
                }
            }

            start = end;
        }

        Ok(CascadeReport {
            corrected_key: corrected,
            disclosed_bits,
        })
    }
}

/// Checks whether two keys match, returning the residual error rate.
///
/// Mismatched lengths count as completely wrong.
pub fn verify_key_correctness(alice_key: &[Bit], bob_key: &[Bit]) -> (bool, f64) {
    if alice_key.len() != bob_key.len() {
        return (false, 1.0);
    }
    if alice_key.is_empty() {
        return (true, 0.0);
    }

    let errors = alice_key
        .iter()
        .zip(bob_key)
        .filter(|(a, b)| a != b)
        .count();

    (errors == 0, errors as f64 / alice_key.len() as f64)
}

/// Fraction of the key leaked through parity disclosure.
pub fn calculate_information_leakage(disclosed_bits: usize, key_length: usize) -> f64 {
    if key_length == 0 {
        return 0.0;
    }
    disclosed_bits as f64 / key_length as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::random_bits;

    fn bits(pattern: &[u8]) -> Vec<Bit> {
        pattern.iter().map(|&b| Bit::from(b != 0)).collect()
    }

    #[test]
    fn parity_is_xor_fold() {
        assert_eq!(calculate_parity(&[]), Bit::Zero);
        assert_eq!(calculate_parity(&bits(&[1])), Bit::One);
        assert_eq!(calculate_parity(&bits(&[1, 1])), Bit::Zero);
        assert_eq!(calculate_parity(&bits(&[1, 0, 1, 1])), Bit::One);
    }

    #[test]
    fn no_errors_still_discloses_parities() {
        let corrector = CascadeCorrector::new(0.0);
        let alice = bits(&[0, 1, 0, 1, 0, 1]);

        let report = corrector.correct(&alice, &alice).unwrap();
        assert_eq!(report.corrected_key, alice);
        assert!(report.disclosed_bits > 0);
    }

    #[test]
    fn single_error_is_corrected() {
        let corrector = CascadeCorrector::new(0.05);
        let alice = bits(&[0, 1, 0, 1]);
        let mut bob = alice.clone();
        bob[1] = bob[1].flip();

        let report = corrector.correct(&alice, &bob).unwrap();
        assert_eq!(report.corrected_key, alice);
        assert!(report.disclosed_bits > 0);
    }

    #[test]
    fn spread_errors_are_corrected() {
        // 100-bit alternating key with ten errors spaced every tenth bit.
        // The spacing keeps each error alone in its initial block, which is
        // within Cascade's per-pass capacity.
        let alice: Vec<Bit> = (0..100).map(|i| Bit::from(i % 2 == 1)).collect();
        let mut bob = alice.clone();
        for index in [5, 15, 25, 35, 45, 55, 65, 75, 85, 95] {
            bob[index] = bob[index].flip();
        }

        let corrector = CascadeCorrector::new(0.10);
        assert_eq!(corrector.initial_block_size(), 7);

        let report = corrector.correct(&alice, &bob).unwrap();
        assert_eq!(report.corrected_key, alice);
        assert!(report.disclosed_bits > 0);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let corrector = CascadeCorrector::new(0.05);
        let err = corrector.correct(&bits(&[0, 1]), &bits(&[0]));
        assert!(matches!(
            err,
            Err(ReconcileError::KeyLengthMismatch { alice: 2, bob: 1 })
        ));
    }

    #[test]
    fn disclosed_bits_cover_every_parity_comparison() {
        // With no errors there are no binary searches, so the disclosure
        // count is exactly the number of block parity comparisons.
        let alice = random_bits(64);
        let corrector = CascadeCorrector::new(0.05); // block size 14

        let mut expected = 0usize;
        let mut block_size = corrector.initial_block_size();
        for _ in 0..CASCADE_PASSES {
            expected += 64usize.div_ceil(block_size);
            block_size *= 2;
        }

        let report = corrector.correct(&alice, &alice).unwrap();
        assert_eq!(report.disclosed_bits, expected);
    }

    #[test]
    fn simple_corrector_fixes_bitwise_blocks() {
        let alice = bits(&[1, 0, 1, 1, 0, 0, 1, 0]);
        let mut bob = alice.clone();
        bob[2] = bob[2].flip();
        bob[6] = bob[6].flip();

        let corrector = SimpleParityCorrector::new(1);
        let report = corrector.correct(&alice, &bob).unwrap();
        assert_eq!(report.corrected_key, alice);
        assert_eq!(report.disclosed_bits, alice.len());
    }

    #[test]
    fn verify_reports_residual_rate() {
        let alice = bits(&[0, 1, 0, 1]);
        let mut bob = alice.clone();

        assert_eq!(verify_key_correctness(&alice, &bob), (true, 0.0));

        bob[0] = bob[0].flip();
        let (matches, rate) = verify_key_correctness(&alice, &bob);
        assert!(!matches);
        assert!((rate - 0.25).abs() < 1e-12);

        assert_eq!(verify_key_correctness(&alice, &bob[..2]), (false, 1.0));
    }

    #[test]
    fn leakage_is_disclosed_over_length() {
        assert_eq!(calculate_information_leakage(50, 100), 0.5);
        assert_eq!(calculate_information_leakage(0, 100), 0.0);
        assert_eq!(calculate_information_leakage(10, 0), 0.0);
    }
}
