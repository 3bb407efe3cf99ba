const DJB2_SEED: u32 = 5381;

/// Bernstein's hash: `h = h * 33 + byte`, wrapping at 32 bits.
#[inline]
pub fn djb2(key: &str) -> u32 {
    key.bytes().fold(DJB2_SEED, |h, b| {
        h.wrapping_mul(33).wrapping_add(b as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_is_seed() {
        assert_eq!(djb2(""), 5381);
    }

    #[test]
    fn test_single_byte() {
        assert_eq!(djb2("a"), 5381 * 33 + 97);
    }

    #[test]
    fn test_wraps_instead_of_overflowing() {
        let long = "x".repeat(255);
        let _ = djb2(&long);
    }
}
