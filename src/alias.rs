//! Random vanity alias generation.
//!
//! Every alias is the base-32 rendering (digits `0-9a-v`, no leading zeros)
//! of a uniformly random 130-bit integer drawn from a cryptographically
//! strong generator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::ALIAS_BITS;

const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Bits above the low `u128` word.
const HIGH_BITS: u32 = ALIAS_BITS - 128;

/// Longest possible alias: 130 bits in 5-bit digits.
pub const MAX_ALIAS_LEN: usize = ALIAS_BITS.div_ceil(5) as usize;

/// Produces independent random aliases.
///
/// `StdRng` is a CSPRNG; seeded from OS entropy by default, or from a fixed
/// seed when runs must be reproducible.
pub struct AliasGenerator {
    rng: StdRng,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for reproducible populations.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Builds the generator for an optional configured seed.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::new(),
        }
    }

    /// Draws a fresh 130-bit value and renders it in base 32.
    pub fn next_alias(&mut self) -> String {
        let low: u128 = self.rng.r#gen();
        let high: u8 = self.rng.r#gen::<u8>() & ((1 << HIGH_BITS) - 1);
        to_base32(high, low)
    }
}

/// Renders the integer `high * 2^128 + low` in base 32 without leading zeros.
pub fn to_base32(high: u8, low: u128) -> String {
    let mut high = high;
    let mut low = low;
    if high == 0 && low == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::with_capacity(MAX_ALIAS_LEN);
    while high != 0 || low != 0 {
        digits.push(DIGITS[(low & 0x1f) as usize]);
        low = (low >> 5) | ((high as u128) << 123);
        high >>= 5;
    }
    digits.reverse();
    // digits are all ASCII
    digits.into_iter().map(char::from).collect()
}
