//! Password strength policy and generated credentials.
//!
//! A password is strong when it meets the configured minimum length and has
//! at least one lowercase letter, one uppercase letter, one digit and one
//! symbol. Generated passwords satisfy the same rule as user-chosen ones.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{AppError, Result};

const LOWER: &[u8] = b"abcdefghjkmnpqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*";

/// Absolute floor regardless of configuration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest password accepted. bcrypt ignores input past 72 bytes.
pub const MAX_PASSWORD_LENGTH: usize = 72;

/// Generate a random password of `length` characters (at least
/// [`MIN_PASSWORD_LENGTH`]) that passes [`validate_password`].
pub fn generate_password(length: usize) -> String {
    let length = length.clamp(MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH);
    let mut rng = rand::rng();
    let pick = |set: &[u8], rng: &mut rand::rngs::ThreadRng| set[rng.random_range(0..set.len())];

    let mut chars: Vec<u8> = vec![
        pick(LOWER, &mut rng),
        pick(UPPER, &mut rng),
        pick(DIGITS, &mut rng),
        pick(SYMBOLS, &mut rng),
    ];
    let all: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
    while chars.len() < length {
        chars.push(pick(&all, &mut rng));
    }
    chars.shuffle(&mut rng);

    chars.into_iter().map(char::from).collect()
}

/// Check `password` against the strength rule with the given minimum length.
pub fn validate_password(password: &str, min_length: usize) -> Result<()> {
    let min_length = min_length.max(MIN_PASSWORD_LENGTH);
    let mut problems = Vec::new();

    if password.chars().count() < min_length {
        problems.push(format!("at least {} characters", min_length));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        problems.push(format!("at most {} bytes", MAX_PASSWORD_LENGTH));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        problems.push("a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        problems.push("an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("a digit".to_string());
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        problems.push("a symbol".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Password must contain {}",
            problems.join(", ")
        )))
    }
}
