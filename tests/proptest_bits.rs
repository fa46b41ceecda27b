use proptest::prelude::*;

use qkd_engine::{bits_to_bytes, bytes_to_bits, Bit};

proptest! {
    #[test]
    fn bit_byte_round_trip_is_identity(raw in prop::collection::vec(any::<bool>(), 0..512)) {
        let bits: Vec<Bit> = raw.iter().map(|&b| Bit::from(b)).collect();

        let bytes = bits_to_bytes(&bits);
        prop_assert_eq!(bytes.len(), bits.len().div_ceil(8));

        let back = bytes_to_bits(&bytes, bits.len());
        prop_assert_eq!(back, bits);
    }

    #[test]
    fn trailing_padding_bits_are_zero(raw in prop::collection::vec(any::<bool>(), 1..512)) {
        let bits: Vec<Bit> = raw.iter().map(|&b| Bit::from(b)).collect();
        let bytes = bits_to_bytes(&bits);

        let used = bits.len() % 8;
        if used != 0 {
            let last = bytes[bytes.len() - 1];
            let padding_mask = (1u16 << (8 - used)) as u8 - 1;
            prop_assert_eq!(last & padding_mask, 0);
        }
    }
}
