//! Transfer code generation

use rand::Rng;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Shortest code the relay accepts
pub const MIN_CODE_LENGTH: usize = 8;

/// Random lowercase alphanumeric code with at least one digit.
/// Lengths below [`MIN_CODE_LENGTH`] are raised to it.
pub fn generate(length: usize) -> String {
    let length = length.max(MIN_CODE_LENGTH);
    let mut rng = rand::thread_rng();

    let mut code: Vec<u8> = (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())])
        .collect();

    if !code.iter().any(u8::is_ascii_digit) {
        let slot = rng.gen_range(0..length);
        code[slot] = b'0' + rng.gen_range(0..10u8);
    }

    code.into_iter().map(char::from).collect()
}
