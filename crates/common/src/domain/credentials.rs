//! Random device identifiers and secrets drawn from the operating system CSPRNG.

use data_encoding::BASE32_NOPAD;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Raw entropy behind a device ID (80 bits, 16 base32 characters)
pub const DEVICE_ID_BYTES: usize = 10;

/// Default length of a generated device secret
pub const DEFAULT_SECRET_LENGTH: usize = 16;

/// The set `Alphanumeric` samples from, for checking secret shape
#[cfg(test)]
pub(crate) const SECRET_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a device ID: random bytes encoded as unpadded RFC 4648 base32
pub fn generate_device_id() -> String {
    let mut bytes = [0u8; DEVICE_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

/// Generate a secret of `length` characters, each drawn uniformly from `[a-zA-Z0-9]`
pub fn generate_secret(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
