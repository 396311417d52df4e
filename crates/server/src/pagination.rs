//! Opaque pagination tokens for ListNodes.
//!
//! Page tokens are opaque to clients and include:
//! - HMAC validation to prevent tampering
//! - A filter hash so a token cannot be replayed against a listing
//!   with different type/status filters
//!
//! The token body is postcard-encoded, HMAC-SHA256-signed (truncated),
//! and URL-safe base64-encoded. The key is random per process:
//! pagination is node-local and tokens are not meant to survive a
//! restart.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use nodewatch_types::{decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::Snafu;

/// Token format version for forward compatibility.
const TOKEN_VERSION: u8 = 1;

/// HMAC key length in bytes.
const HMAC_KEY_LENGTH: usize = 32;

/// HMAC output length (truncated).
const HMAC_LENGTH: usize = 16;

/// Internal page token structure.
///
/// Serialized, HMAC'd, and base64-encoded for client use; clients must
/// treat the result as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    /// Token format version.
    pub version: u8,
    /// Resume position in the index enumeration.
    pub offset: u64,
    /// Hash of the filter parameters the listing started with.
    pub filter_hash: [u8; 8],
}

/// Encoded page token with HMAC protection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncodedToken {
    token: PageToken,
    hmac: [u8; HMAC_LENGTH],
}

/// Errors surfaced when decoding or validating a page token.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum PageTokenError {
    /// Not base64, or the payload does not decode.
    #[snafu(display("invalid page token"))]
    InvalidFormat,

    /// The signature does not match (tampering or foreign token).
    #[snafu(display("page token failed validation"))]
    InvalidHmac,

    /// Token from an incompatible format version.
    #[snafu(display("unsupported page token version {version}"))]
    UnsupportedVersion {
        /// The rejected version byte.
        version: u8,
    },

    /// Token minted for a different filter combination.
    #[snafu(display("page token does not match the request filters"))]
    FilterMismatch,
}

/// Page token encoder/decoder with HMAC validation.
pub struct PageTokenCodec {
    key: [u8; HMAC_KEY_LENGTH],
}

impl PageTokenCodec {
    /// Creates a codec with the given key.
    pub fn new(key: [u8; HMAC_KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Creates a codec with a random key, generated at startup.
    pub fn with_random_key() -> Self {
        use rand::RngCore;
        let mut key = [0u8; HMAC_KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Mints a token for the next page at `offset`.
    pub fn mint(&self, offset: u64, filter_hash: [u8; 8]) -> String {
        self.encode(&PageToken { version: TOKEN_VERSION, offset, filter_hash })
    }

    /// Encodes a page token to an opaque string.
    pub fn encode(&self, token: &PageToken) -> String {
        // postcard encoding of these plain structs is infallible
        let Ok(token_bytes) = encode(token) else {
            return String::new();
        };

        let encoded = EncodedToken { token: token.clone(), hmac: self.sign(&token_bytes) };
        let Ok(bytes) = encode(&encoded) else {
            return String::new();
        };
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Decodes and validates a page token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for malformed input, `InvalidHmac` when
    /// the signature fails, `UnsupportedVersion` for a foreign format.
    pub fn decode(&self, encoded: &str) -> Result<PageToken, PageTokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| PageTokenError::InvalidFormat)?;

        let encoded_token: EncodedToken =
            decode(&bytes).map_err(|_| PageTokenError::InvalidFormat)?;

        let token_bytes =
            encode(&encoded_token.token).map_err(|_| PageTokenError::InvalidFormat)?;
        if self.sign(&token_bytes) != encoded_token.hmac {
            return Err(PageTokenError::InvalidHmac);
        }

        if encoded_token.token.version != TOKEN_VERSION {
            return Err(PageTokenError::UnsupportedVersion {
                version: encoded_token.token.version,
            });
        }

        Ok(encoded_token.token)
    }

    /// Validates that a token was minted for the same filters.
    ///
    /// # Errors
    ///
    /// Returns `FilterMismatch` when the filter hash differs.
    pub fn validate_filters(
        &self,
        token: &PageToken,
        filter_hash: [u8; 8],
    ) -> Result<(), PageTokenError> {
        if token.filter_hash != filter_hash {
            return Err(PageTokenError::FilterMismatch);
        }
        Ok(())
    }

    fn sign(&self, payload: &[u8]) -> [u8; HMAC_LENGTH] {
        let mut mac = match <Hmac<Sha256>>::new_from_slice(&self.key) {
            Ok(mac) => mac,
            // new_from_slice accepts any length for SHA-256
            Err(_) => return [0u8; HMAC_LENGTH],
        };
        mac.update(payload);
        let digest = mac.finalize().into_bytes();

        let mut truncated = [0u8; HMAC_LENGTH];
        truncated.copy_from_slice(&digest[..HMAC_LENGTH]);
        truncated
    }
}

/// Deterministic hash of the list filter parameters.
pub fn filter_hash(type_filter: i32, status_filter: i32) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(type_filter.to_be_bytes());
    hasher.update(status_filter.to_be_bytes());
    let digest = hasher.finalize();

    let mut hash = [0u8; 8];
    hash.copy_from_slice(&digest[..8]);
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codec = PageTokenCodec::with_random_key();
        let token = codec.mint(200, filter_hash(2, 0));
        let decoded = codec.decode(&token).expect("decode");
        assert_eq!(decoded.offset, 200);
        assert_eq!(decoded.filter_hash, filter_hash(2, 0));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let codec = PageTokenCodec::with_random_key();
        let token = codec.mint(100, filter_hash(0, 0));

        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        bytes[1] ^= 0xFF;
        let tampered = URL_SAFE_NO_PAD.encode(&bytes);

        let err = codec.decode(&tampered).unwrap_err();
        assert!(
            matches!(err, PageTokenError::InvalidHmac | PageTokenError::InvalidFormat),
            "got {err:?}"
        );
    }

    #[test]
    fn garbage_is_invalid_format() {
        let codec = PageTokenCodec::with_random_key();
        assert_eq!(codec.decode("not a token!").unwrap_err(), PageTokenError::InvalidFormat);
        assert_eq!(codec.decode("").unwrap_err(), PageTokenError::InvalidFormat);
    }

    #[test]
    fn token_from_another_key_fails_validation() {
        let minter = PageTokenCodec::with_random_key();
        let verifier = PageTokenCodec::with_random_key();
        let token = minter.mint(10, filter_hash(0, 0));
        assert_eq!(verifier.decode(&token).unwrap_err(), PageTokenError::InvalidHmac);
    }

    #[test]
    fn filter_change_invalidates_the_token() {
        let codec = PageTokenCodec::with_random_key();
        let token = codec.mint(10, filter_hash(2, 0));
        let decoded = codec.decode(&token).expect("decode");

        codec.validate_filters(&decoded, filter_hash(2, 0)).expect("same filters");
        assert_eq!(
            codec.validate_filters(&decoded, filter_hash(1, 0)).unwrap_err(),
            PageTokenError::FilterMismatch
        );
    }

    #[test]
    fn filter_hash_distinguishes_combinations() {
        assert_ne!(filter_hash(0, 0), filter_hash(1, 0));
        assert_ne!(filter_hash(1, 0), filter_hash(0, 1));
        assert_eq!(filter_hash(2, 3), filter_hash(2, 3));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let codec = PageTokenCodec::new([7u8; HMAC_KEY_LENGTH]);
        let token = PageToken { version: 9, offset: 0, filter_hash: [0u8; 8] };
        let encoded = codec.encode(&token);
        assert_eq!(
            codec.decode(&encoded).unwrap_err(),
            PageTokenError::UnsupportedVersion { version: 9 }
        );
    }
}
