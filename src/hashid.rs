//! Post ID obfuscation.
//!
//! Posts are stored under sequential SQLite row ids, but public links carry
//! an 8-character hex token instead. The mapping is a multiplicative
//! permutation of `[0, MODULUS)`:
//!
//! ```text
//! encode(n) = (n * MULTIPLIER) mod MODULUS      -> "%08x"
//! decode(h) = (h * INVERSE)    mod MODULUS
//! ```
//!
//! `MULTIPLIER` (3^18) is coprime with `MODULUS` and `INVERSE` is its modular
//! inverse, so the pair round-trips for every id below `MODULUS`. This is an
//! obfuscation, not a cryptographic hash: anyone holding two tokens can
//! recover the constants.

use thiserror::Error;

/// Size of the id space. Every token decodes to a value below this.
pub const MODULUS: u64 = 4_000_000_000;

/// Forward multiplier.
pub const MULTIPLIER: u64 = 387_420_489;

/// Modular inverse of [`MULTIPLIER`] modulo [`MODULUS`].
pub const INVERSE: u64 = 3_513_180_409;

/// Length of a rendered token.
pub const TOKEN_LEN: usize = 8;

/// Token errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("id {0} is outside the token space")]
    OutOfRange(u64),

    #[error("token must be {TOKEN_LEN} hex characters")]
    Malformed,
}

fn mul_mod(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) % MODULUS as u128) as u64
}

/// Encode a row id as an 8-character lowercase hex token.
pub fn encode(id: u64) -> Result<String, TokenError> {
    if id >= MODULUS {
        return Err(TokenError::OutOfRange(id));
    }

    Ok(format!("{:08x}", mul_mod(id, MULTIPLIER)))
}

/// Decode a token back to its row id.
///
/// Accepts upper or lower case hex. Values at or above [`MODULUS`] are never
/// produced by [`encode`] and are rejected.
pub fn decode(token: &str) -> Result<u64, TokenError> {
    if token.len() != TOKEN_LEN || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(TokenError::Malformed);
    }

    let value = u64::from_str_radix(token, 16).map_err(|_| TokenError::Malformed)?;
    if value >= MODULUS {
        return Err(TokenError::OutOfRange(value));
    }

    Ok(mul_mod(value, INVERSE))
}

/// Whether a string has the shape of a token (does not check range).
pub fn looks_like_token(s: &str) -> bool {
    s.len() == TOKEN_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}
