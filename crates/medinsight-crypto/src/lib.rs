//! `MedInsight` crypto primitives.
//!
//! - **Records**: ChaCha20-Poly1305 AEAD with a key derived from the
//!   configured secret via HKDF-SHA256; a fresh random 12-byte nonce per
//!   sealed value.
//! - **Codes**: uniformly random 6-digit one-time codes, alphanumeric access
//!   codes, and constant-time comparison for presented codes.

pub mod codes;
pub mod error;
pub mod record;

pub use codes::{
    OTP_CODE_LEN, constant_time_str_eq, generate_access_code, generate_otp_code,
    is_well_formed_otp,
};
pub use error::CryptoError;
pub use record::{NONCE_SIZE, RecordCipher, SealedRecord};
