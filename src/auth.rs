//! Password hashing and the user store behind the login form.
//!
//! Hashes use PBKDF2-HMAC-SHA256 with a single 32-byte output block and
//! a random 16-byte salt, encoded as:
//!
//! ```text
//! pbkdf2-sha256$<iterations>$<salt_hex>$<hash_hex>
//! ```
//!
//! Users come from `[[auth.users]]` in the config file; generate entries
//! with `sgw hash-password`.

use sha2::Sha256;
use std::collections::HashMap;

use crate::config::AuthConfig;

pub const HASH_SCHEME: &str = "pbkdf2-sha256";
pub const DEFAULT_ITERATIONS: u32 = 100_000;

fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn hash_password(password: &str) -> String {
    hash_password_with(password, DEFAULT_ITERATIONS)
}

/// Hash with an explicit iteration count. Low counts are for tests only.
pub fn hash_password_with(password: &str, iterations: u32) -> String {
    let iterations = iterations.max(1);
    let salt = *uuid::Uuid::new_v4().as_bytes();
    let derived = derive_key(password.as_bytes(), &salt, iterations);
    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        iterations,
        hex::encode(salt),
        hex::encode(derived)
    )
}

/// Checks `password` against an encoded hash. Malformed hashes never match.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let parts: Vec<&str> = encoded.split('$').collect();
    let [scheme, iterations, salt, expected] = parts[..] else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        hex::decode(salt),
        hex::decode(expected),
    ) else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let derived = derive_key(password.as_bytes(), &salt, iterations);
    constant_time_eq(&derived, &expected)
}

/// Source of login credentials.
pub trait UserStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;

    /// Whether `username` still exists; sessions of removed users lapse.
    fn contains(&self, username: &str) -> bool;
}

/// Users declared in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigUserStore {
    users: HashMap<String, String>,
}

impl ConfigUserStore {
    pub fn from_config(auth: &AuthConfig) -> Self {
        Self {
            users: auth
                .users
                .iter()
                .map(|u| (u.username.clone(), u.password_hash.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl UserStore for ConfigUserStore {
    fn verify(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(hash) => verify_password(password, hash),
            None => {
                // Same work for unknown users as for a wrong password.
                let _ = derive_key(password.as_bytes(), b"unknown-user-salt", DEFAULT_ITERATIONS);
                false
            }
        }
    }

    fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }
}
