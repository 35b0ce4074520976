//! One-time and access code generation.

use rand::Rng;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

/// Width of a one-time code.
pub const OTP_CODE_LEN: usize = 6;

/// Exclusive upper bound for one-time code values.
const OTP_CODE_SPACE: u32 = 1_000_000;

/// Characters used for generated access codes. Ambiguous glyphs
/// (`0`/`O`, `1`/`I`) are left out because codes are relayed by hand.
const ACCESS_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Uniform value in `0..=999_999`, zero-padded to six digits.
pub fn generate_otp_code() -> String {
    let value = OsRng.gen_range(0..OTP_CODE_SPACE);
    format!("{value:0width$}", width = OTP_CODE_LEN)
}

/// Random uppercase alphanumeric access code of `len` characters.
pub fn generate_access_code(len: usize) -> String {
    (0..len)
        .map(|_| {
            let idx = OsRng.gen_range(0..ACCESS_CODE_CHARSET.len());
            char::from(ACCESS_CODE_CHARSET[idx])
        })
        .collect()
}

/// Exactly six ASCII digits.
pub fn is_well_formed_otp(code: &str) -> bool {
    code.len() == OTP_CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two codes without leaking the position of the first mismatch.
///
/// Differing lengths return `false` immediately; code lengths are not secret.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
