//! # Activation Codes
//!
//! Minting of the short code a doorplate shows on its screen while waiting
//! to be bound.
//!
//! ## Code Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Alphabet (no look-alikes: 0/O, 1/I/l are excluded)                     │
//! │                                                                         │
//! │    upper   ABCDEFGHJKLMNPQRSTUVWXYZ                                     │
//! │    lower   abcdefghijkmnpqrstuvwxyz                                     │
//! │    digits  23456789                                                     │
//! │                                                                         │
//! │  1. length ← uniform in [12, 16]                                        │
//! │  2. one char from each class                                            │
//! │  3. fill the rest from the union                                        │
//! │  4. shuffle                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rand::seq::SliceRandom;
use rand::Rng;

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnpqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";

/// Shortest code the generator produces.
pub const MIN_CODE_LEN: usize = 12;
/// Longest code the generator produces.
pub const MAX_CODE_LEN: usize = 16;

/// Mints a code of random length in `MIN_CODE_LEN..=MAX_CODE_LEN`.
pub fn generate_activation_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let len = rng.gen_range(MIN_CODE_LEN..=MAX_CODE_LEN);
    mint(rng, len)
}

fn mint<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let mut chars: Vec<u8> = Vec::with_capacity(len);
    chars.push(pick(rng, UPPER));
    chars.push(pick(rng, LOWER));
    chars.push(pick(rng, DIGITS));

    let total = UPPER.len() + LOWER.len() + DIGITS.len();
    while chars.len() < len {
        let idx = rng.gen_range(0..total);
        let c = if idx < UPPER.len() {
            UPPER[idx]
        } else if idx < UPPER.len() + LOWER.len() {
            LOWER[idx - UPPER.len()]
        } else {
            DIGITS[idx - UPPER.len() - LOWER.len()]
        };
        chars.push(c);
    }

    chars.shuffle(rng);
    chars.into_iter().map(char::from).collect()
}

fn pick<R: Rng + ?Sized>(rng: &mut R, class: &[u8]) -> u8 {
    class[rng.gen_range(0..class.len())]
}

/// Checks that `code` could have come from this generator.
pub fn is_well_formed_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&bytes.len())
        && bytes.iter().all(|b| UPPER.contains(b) || LOWER.contains(b) || DIGITS.contains(b))
        && bytes.iter().any(|b| UPPER.contains(b))
        && bytes.iter().any(|b| LOWER.contains(b))
        && bytes.iter().any(|b| DIGITS.contains(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_codes_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let code = generate_activation_code(&mut rng);
            assert!(is_well_formed_code(&code), "bad code {}", code);
        }
    }

    #[test]
    fn test_codes_never_contain_confusable_characters() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..500 {
            let code = generate_activation_code(&mut rng);
            assert!(!code.chars().any(|c| "0O1Il".contains(c)), "bad code {}", code);
        }
    }

    #[test]
    fn test_length_covers_full_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; MAX_CODE_LEN + 1];
        for _ in 0..1000 {
            seen[generate_activation_code(&mut rng).len()] = true;
        }
        assert!((MIN_CODE_LEN..=MAX_CODE_LEN).all(|len| seen[len]));
    }

    #[test]
    fn test_is_well_formed_code() {
        assert!(is_well_formed_code("Ab3dEf7hJk9m"));
        assert!(!is_well_formed_code("ABCDEFGHJKLM"));
        assert!(!is_well_formed_code("Ab3dEf7hJk0m"));
        assert!(!is_well_formed_code("Ab3"));
    }
}
