/*!
Password hashing and session-cookie signing.

Stored password hashes are self-describing strings of the form
`sha256$<salt>$<hex digest>`, where the digest is an iterated SHA-256
over the per-user salt and the password. Session cookies carry the
opaque session id together with a keyed digest of it, so a tampered
cookie never reaches the session store.
*/
use std::fmt::Write;

use rand::{Rng, distributions};
use sha2::{Digest, Sha256};

const HASH_SCHEME: &str = "sha256";
const HASH_ROUNDS: u32 = 1_000;
const SALT_LENGTH: usize = 8;
const TOKEN_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// The outcome of checking a uname/password pair against the user store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AuthResult {
    Ok,
    NoSuchUser,
    BadPassword,
}

/// Generate a random string of `length` characters from `TOKEN_CHARS`.
///
/// Used for user salts, session ids, and the generated fallback secret.
pub fn random_token(length: usize) -> String {
    // TOKEN_CHARS never has zero length.
    let chars: Vec<char> = TOKEN_CHARS.chars().collect();
    let dist = distributions::Slice::new(&chars).unwrap();
    let rng = rand::thread_rng();
    let token: String = rng.sample_iter(&dist)
        .take(length)
        .collect();
    token
}

fn hex_string(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 * bytes.len());
    for b in bytes.iter() {
        write!(&mut s, "{:02x}", b).unwrap();
    }
    s
}

fn digest(salt: &str, password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let mut d = hasher.finalize();
    for _ in 1..HASH_ROUNDS {
        let mut hasher = Sha256::new();
        hasher.update(&d);
        d = hasher.finalize();
    }
    d.into()
}

/// Byte-slice equality that examines every byte regardless of where the
/// first mismatch occurs.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() { return false; }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Hash `password` with a fresh random salt for storage.
pub fn hash_password(password: &str) -> String {
    let salt = random_token(SALT_LENGTH);
    let d = digest(&salt, password);
    format!("{}${}${}", HASH_SCHEME, &salt, &hex_string(&d))
}

/// Check `password` against a stored `sha256$salt$digest` string.
pub fn check_password(stored: &str, password: &str) -> bool {
    let mut chunks = stored.splitn(3, '$');
    let (scheme, salt, stored_hex) = match (chunks.next(), chunks.next(), chunks.next()) {
        (Some(scheme), Some(salt), Some(hex)) => (scheme, salt, hex),
        _ => {
            log::warn!("Stored password hash is not in scheme$salt$digest form.");
            return false;
        },
    };
    if scheme != HASH_SCHEME {
        log::warn!("Stored password hash has unknown scheme {:?}.", scheme);
        return false;
    }

    let d = digest(salt, password);
    ct_eq(hex_string(&d).as_bytes(), stored_hex.as_bytes())
}

fn keyed_digest(secret: &str, id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(id.as_bytes());
    hasher.finalize().into()
}

/// Produce the `<id>.<hexsig>` cookie value for a session id.
pub fn sign_session_id(secret: &str, id: &str) -> String {
    format!("{}.{}", id, &hex_string(&keyed_digest(secret, id)))
}

/// Recover the session id from a cookie value, or `None` if the
/// signature doesn't check out.
pub fn verify_session_id<'a>(secret: &str, cookie_value: &'a str) -> Option<&'a str> {
    let (id, sig) = cookie_value.split_once('.')?;
    let expected = hex_string(&keyed_digest(secret, id));
    if ct_eq(expected.as_bytes(), sig.as_bytes()) {
        Some(id)
    } else {
        log::warn!("Session cookie with bad signature rejected.");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    #[test]
    fn hash_and_check() {
        ensure_logging();

        let stored = hash_password("pw1");
        assert!(stored.starts_with("sha256$"));
        assert!(check_password(&stored, "pw1"));
        assert!(!check_password(&stored, "pw2"));
        assert!(!check_password(&stored, ""));
    }

    #[test]
    fn distinct_salts() {
        let a = hash_password("pw1");
        let b = hash_password("pw1");
        assert_ne!(a, b);
        assert!(check_password(&a, "pw1"));
        assert!(check_password(&b, "pw1"));
    }

    #[test]
    fn malformed_stored_hash() {
        ensure_logging();
        assert!(!check_password("not-a-hash", "pw1"));
        assert!(!check_password("md5$salt$abcdef", "pw1"));
        assert!(!check_password("", "pw1"));
    }

    #[test]
    fn sign_and_verify() {
        let id = random_token(32);
        let cookie = sign_session_id("sekrit", &id);
        assert_eq!(verify_session_id("sekrit", &cookie), Some(id.as_str()));
    }

    #[test]
    fn tampered_cookie_rejected() {
        ensure_logging();

        let cookie = sign_session_id("sekrit", "abc123");
        let mut tampered = cookie.replace("abc123", "abc124");
        assert_eq!(verify_session_id("sekrit", &tampered), None);

        // Signature from the wrong secret.
        tampered = sign_session_id("wrong-secret", "abc123");
        assert_eq!(verify_session_id("sekrit", &tampered), None);

        // No signature at all.
        assert_eq!(verify_session_id("sekrit", "abc123"), None);
    }

    #[test]
    fn ct_eq_basics() {
        assert!(ct_eq(b"abcd", b"abcd"));
        assert!(!ct_eq(b"abcd", b"abce"));
        assert!(!ct_eq(b"abcd", b"abc"));
        assert!(ct_eq(b"", b""));
    }
}
