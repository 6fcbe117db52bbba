//! Fletcher-style checksum protecting the persisted ledger.
//!
//! Two accumulators run over little-endian 16 bit words, both reduced modulo
//! the largest prime below 2^16. The result packs `sum2` into the upper half
//! and `sum1` into the lower half.

const MAGIC_PRIME: u32 = 65521;

pub fn checksum(bytes: &[u8]) -> u32 {
    let mut sum1: u32 = 0;
    let mut sum2: u32 = 0;

    for word in bytes.chunks(2) {
        //A trailing odd byte counts as a zero extended word
        let value = match word {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            [lo] => u16::from(*lo),
            _ => 0,
        };
        sum1 = (sum1 + u32::from(value)) % MAGIC_PRIME;
        sum2 = (sum2 + sum1) % MAGIC_PRIME;
    }

    (sum2 << 16) | sum1
}

#[cfg(test)]
mod tests {
    use super::checksum;
    use proptest::prelude::*;

    #[test]
    fn known_vectors() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01]), (1 << 16) | 1);
        // words 0x0201, 0x0403: sum1 = 0x0604, sum2 = 0x0201 + 0x0604
        assert_eq!(checksum(&[0x01, 0x02, 0x03, 0x04]), (0x0805 << 16) | 0x0604);
    }

    #[test]
    fn reduces_modulo_prime() {
        // 0xFFFF = 65535 = 65521 + 14
        assert_eq!(checksum(&[0xFF, 0xFF]), (14 << 16) | 14);
    }

    #[test]
    fn word_order_matters() {
        assert_ne!(checksum(&[1, 0, 2, 0]), checksum(&[2, 0, 1, 0]));
    }

    proptest! {
        #[test]
        fn deterministic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(checksum(&bytes), checksum(&bytes));
        }

        #[test]
        fn single_bit_flip_changes_checksum(
            bytes in prop::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut corrupted = bytes.clone();
            let i = index.index(corrupted.len());
            corrupted[i] ^= 1 << bit;
            prop_assert_ne!(checksum(&bytes), checksum(&corrupted));
        }
    }
}
