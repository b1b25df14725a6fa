//! Device and user code generation.
//!
//! Both codes come from the operating system CSPRNG. A guessable user code
//! would let an attacker approve someone else's device.

use base32::{encode as base32_encode, Alphabet};
use rand::{rngs::OsRng, TryRngCore};

use crate::error::{DeviceAuthError, Result};

const DEVICE_CODE_BYTES: usize = 32;
const USER_CODE_BYTES: usize = 8;
const USER_CODE_LEN: usize = 8;
const USER_CODE_GROUP: usize = 4;

const ALPHABET: Alphabet = Alphabet::Rfc4648 { padding: false };

fn random_bytes(length: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| DeviceAuthError::Internal(format!("random source failed: {e}")))?;
    Ok(bytes)
}

/// Generate the opaque code held by the polling client.
///
/// ```
/// let code = devauth::codegen::generate_device_code().unwrap();
/// assert_eq!(code.len(), 52);
/// ```
pub fn generate_device_code() -> Result<String> {
    let bytes = random_bytes(DEVICE_CODE_BYTES)?;
    Ok(base32_encode(ALPHABET, &bytes))
}

/// Generate a human-typable code in `XXXX-XXXX` form.
///
/// ```
/// let code = devauth::codegen::generate_user_code().unwrap();
/// assert_eq!(code.len(), 9);
/// assert_eq!(&code[4..5], "-");
/// ```
pub fn generate_user_code() -> Result<String> {
    let bytes = random_bytes(USER_CODE_BYTES)?;
    let encoded = base32_encode(ALPHABET, &bytes);
    Ok(format_user_code(&encoded[..USER_CODE_LEN]))
}

/// Canonicalize user input into `XXXX-XXXX`.
///
/// Case, whitespace and hyphens are ignored. Returns `None` if what remains
/// is not eight base32 characters.
pub fn normalize_user_code(input: &str) -> Option<String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if cleaned.len() != USER_CODE_LEN || !cleaned.chars().all(is_base32_char) {
        return None;
    }
    Some(format_user_code(&cleaned))
}

fn format_user_code(raw: &str) -> String {
    format!("{}-{}", &raw[..USER_CODE_GROUP], &raw[USER_CODE_GROUP..])
}

fn is_base32_char(c: char) -> bool {
    c.is_ascii_uppercase() || ('2'..='7').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn user_code_has_two_groups_of_base32() {
        for _ in 0..50 {
            let code = generate_user_code().unwrap();
            let (left, right) = code.split_once('-').expect("hyphen");
            assert_eq!(left.len(), 4);
            assert_eq!(right.len(), 4);
            assert!(left.chars().chain(right.chars()).all(is_base32_char));
        }
    }

    #[test]
    fn device_code_is_unpadded_base32() {
        let code = generate_device_code().unwrap();
        assert_eq!(code.len(), 52);
        assert!(!code.contains('='));
        assert!(code.chars().all(is_base32_char));
    }

    #[test]
    fn device_codes_do_not_repeat() {
        let codes: HashSet<String> = (0..200).map(|_| generate_device_code().unwrap()).collect();
        assert_eq!(codes.len(), 200);
    }

    #[test]
    fn normalize_accepts_loose_input() {
        assert_eq!(normalize_user_code("abcd efgh").as_deref(), Some("ABCD-EFGH"));
        assert_eq!(normalize_user_code(" abcd-EF23 ").as_deref(), Some("ABCD-EF23"));
        assert_eq!(normalize_user_code("ABCDEFGH").as_deref(), Some("ABCD-EFGH"));
    }

    #[test]
    fn normalize_rejects_bad_input() {
        assert_eq!(normalize_user_code("ABC-EFGH"), None);
        assert_eq!(normalize_user_code("ABCD-EFG1"), None);
        assert_eq!(normalize_user_code("ABCD-EFGHI"), None);
        assert_eq!(normalize_user_code(""), None);
    }
}
