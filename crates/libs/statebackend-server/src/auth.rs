//! HTTP Basic authentication (part of component C6).

use axum::http::HeaderValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Configured credentials. `None` disables auth entirely (a warning is
/// logged once, at startup, by the caller).
#[derive(Debug, Clone)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
    pub realm: String,
}

impl BasicAuthConfig {
    pub fn www_authenticate_header(&self) -> HeaderValue {
        HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm))
            .unwrap_or_else(|_| HeaderValue::from_static("Basic realm=\"statebackend-git\""))
    }

    /// Verifies an `Authorization: Basic <base64>` header value.
    ///
    /// Usernames and passwords are hashed to a fixed-width digest before
    /// comparison so that neither the comparison time nor any early return
    /// depends on how many of the candidate's bytes happen to match —
    /// only on whether they match at all.
    pub fn verify(&self, authorization_header: &str) -> bool {
        let Some(encoded) = authorization_header.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = BASE64.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        let Some((username, password)) = decoded.split_once(':') else {
            return false;
        };

        constant_time_eq(&hash(username), &hash(&self.username))
            && constant_time_eq(&hash(password), &hash(&self.password))
    }
}

fn hash(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BasicAuthConfig {
        BasicAuthConfig {
            username: "alice".to_string(),
            password: "s3cret".to_string(),
            realm: "statebackend-git".to_string(),
        }
    }

    fn header(username: &str, password: &str) -> String {
        format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
    }

    #[test]
    fn accepts_correct_credentials() {
        assert!(config().verify(&header("alice", "s3cret")));
    }

    #[test]
    fn rejects_wrong_password() {
        assert!(!config().verify(&header("alice", "wrong")));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(!config().verify("Bearer whatever"));
        assert!(!config().verify("Basic not-base64!!"));
    }
}
