// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! MD5 challenge-response helpers

use md5::{Digest, Md5};

/// Produces the client nonce for an auth exchange
pub type NonceSource = Box<dyn FnMut() -> String + Send>;

/// Hex MD5 of a random value
pub fn random_cnonce() -> String {
    let seed: f64 = rand::random();
    md5_hex(seed.to_string().as_bytes())
}

/// Response to a challenge: hex MD5 of password, server nonce and client nonce
pub fn auth_response(password: &str, nonce: &str, cnonce: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.update(cnonce.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_known_vectors() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        let data: Vec<u8> = (0..100).collect();
        assert_eq!(md5_hex(&data), "7acedd1a84a4cfcb6e7a16003242945e");
    }

    #[test]
    fn test_auth_response_known_vectors() {
        assert_eq!(
            auth_response(
                "test",
                "abcdefghijklmnopqrstuvwxyz012345",
                "0123456789abcdef0123456789abcdef"
            ),
            "1c5aafc6744a55547b151f30212ad672"
        );
        assert_eq!(
            auth_response("hunter2", &"a".repeat(32), &"b".repeat(32)),
            "798d87e45e0729ee036ee249f300a1ed"
        );
    }

    #[test]
    fn test_random_cnonce_shape() {
        let a = random_cnonce();
        let b = random_cnonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
