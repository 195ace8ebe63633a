//! Ed25519 keypair management and the protobuf key envelopes used by the
//! name encoding and the textual private-key import/export format.

use core::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use prost::Message;
use rand::RngCore;

pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};

use ed25519_dalek::{Signer, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};

/// Error generating or importing a signing keypair.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The system RNG refused to produce key material.
    #[error("key generation failed: {0}")]
    KeyGenFailed(String),

    /// The text is not a base64-wrapped key envelope.
    #[error("the encoded private key could not be decoded")]
    InvalidEncoding,

    /// The envelope decoded, but wraps a key scheme other than Ed25519.
    #[error("unsupported key scheme ({0}); only Ed25519 keys are accepted")]
    UnsupportedScheme(i32),

    /// The wrapped key material has the wrong length.
    #[error("the decoded private key has an invalid length ({0})")]
    InvalidLength(usize),

    /// A 64-byte envelope whose public half does not match its secret half.
    #[error("the public half of the imported key does not match its secret")]
    MismatchedKeyHalves,
}

impl KeyError {
    /// Whether this is the key-generation failure mode.
    pub fn is_key_gen_failed(&self) -> bool {
        matches!(self, KeyError::KeyGenFailed(_))
    }
}

/// Key schemes understood by the envelope wire format. Only Ed25519 is
/// accepted; the other tags exist so foreign envelopes fail with a
/// scheme error instead of a decoding error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum KeyScheme {
    /// RSA (unsupported).
    Rsa = 0,
    /// Ed25519, the one supported signing scheme.
    Ed25519 = 1,
    /// secp256k1 (unsupported).
    Secp256k1 = 2,
    /// ECDSA (unsupported).
    Ecdsa = 3,
}

/// Wire envelope shared by public and private keys: a scheme tag plus the
/// raw key material.
#[derive(Clone, PartialEq, prost::Message)]
struct KeyEnvelope {
    #[prost(enumeration = "KeyScheme", tag = "1")]
    scheme: i32,
    #[prost(bytes = "vec", tag = "2")]
    data: Vec<u8>,
}

/// Encode `public_key` into its protobuf envelope.
///
/// The encoding is deterministic, which makes the name derived from it
/// injective per public key.
pub(crate) fn encode_public_key_envelope(public_key: &VerifyingKey) -> Vec<u8> {
    KeyEnvelope {
        scheme: KeyScheme::Ed25519 as i32,
        data: public_key.to_bytes().to_vec(),
    }
    .encode_to_vec()
}

/// Decode a public key from its protobuf envelope.
pub(crate) fn decode_public_key_envelope(bytes: &[u8]) -> Result<VerifyingKey, KeyError> {
    let envelope = KeyEnvelope::decode(bytes).map_err(|_| KeyError::InvalidEncoding)?;
    if envelope.scheme != KeyScheme::Ed25519 as i32 {
        return Err(KeyError::UnsupportedScheme(envelope.scheme));
    }
    let data: [u8; PUBLIC_KEY_LENGTH] = envelope
        .data
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidLength(envelope.data.len()))?;
    VerifyingKey::from_bytes(&data).map_err(|_| KeyError::InvalidEncoding)
}

/// An Ed25519 signing keypair authoring records.
#[derive(Clone, PartialEq)]
pub struct Keypair(SigningKey);

impl Keypair {
    /// Generate a fresh random keypair.
    ///
    /// The only failure mode is the system RNG refusing to produce bytes.
    pub fn generate() -> Result<Self, KeyError> {
        let mut secret = [0u8; SECRET_KEY_LENGTH];
        rand::thread_rng()
            .try_fill_bytes(&mut secret)
            .map_err(|e| KeyError::KeyGenFailed(e.to_string()))?;
        Ok(Self(SigningKey::from_bytes(&secret)))
    }

    /// Construct a keypair from a 32-byte secret.
    pub fn from_secret(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self(SigningKey::from_bytes(secret))
    }

    /// The public half of this keypair.
    pub fn public_key(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    /// Sign `message` with this keypair.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.0.sign(message)
    }

    /// Render this keypair as base64 text wrapping the protobuf key
    /// envelope, the format accepted by [`Keypair::from_encoded`].
    pub fn to_encoded(&self) -> String {
        let mut data = Vec::with_capacity(SECRET_KEY_LENGTH + PUBLIC_KEY_LENGTH);
        data.extend_from_slice(&self.0.to_bytes());
        data.extend_from_slice(&self.public_key().to_bytes());
        BASE64.encode(
            KeyEnvelope {
                scheme: KeyScheme::Ed25519 as i32,
                data,
            }
            .encode_to_vec(),
        )
    }

    /// Decode a keypair from base64 text wrapping a protobuf key envelope.
    ///
    /// Surrounding whitespace is trimmed first and empty input fails fast.
    /// The envelope may carry either the bare 32-byte secret or the 64-byte
    /// secret-plus-public form, in which case the halves must agree.
    pub fn from_encoded(text: &str) -> Result<Self, KeyError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(KeyError::InvalidEncoding);
        }
        let bytes = BASE64.decode(trimmed).map_err(|_| KeyError::InvalidEncoding)?;
        let envelope = KeyEnvelope::decode(bytes.as_slice()).map_err(|_| KeyError::InvalidEncoding)?;
        if envelope.scheme != KeyScheme::Ed25519 as i32 {
            return Err(KeyError::UnsupportedScheme(envelope.scheme));
        }
        match envelope.data.len() {
            SECRET_KEY_LENGTH => {
                let mut secret = [0u8; SECRET_KEY_LENGTH];
                secret.copy_from_slice(&envelope.data);
                Ok(Self::from_secret(&secret))
            }
            len if len == SECRET_KEY_LENGTH + PUBLIC_KEY_LENGTH => {
                let mut secret = [0u8; SECRET_KEY_LENGTH];
                secret.copy_from_slice(&envelope.data[..SECRET_KEY_LENGTH]);
                let keypair = Self::from_secret(&secret);
                if keypair.public_key().to_bytes() != envelope.data[SECRET_KEY_LENGTH..] {
                    return Err(KeyError::MismatchedKeyHalves);
                }
                Ok(keypair)
            }
            other => Err(KeyError::InvalidLength(other)),
        }
    }
}

impl fmt::Debug for Keypair {
    // The secret half stays out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Keypair").field(&self.public_key()).finish()
    }
}

impl From<SigningKey> for Keypair {
    fn from(key: SigningKey) -> Self {
        Self(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let keypair = Keypair::generate().unwrap();
        let encoded = keypair.to_encoded();
        let recovered = Keypair::from_encoded(&encoded).unwrap();
        assert_eq!(recovered.public_key(), keypair.public_key());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let keypair = Keypair::generate().unwrap();
        let padded = format!("\n  {}  \n", keypair.to_encoded());
        let recovered = Keypair::from_encoded(&padded).unwrap();
        assert_eq!(recovered.public_key(), keypair.public_key());
    }

    #[test]
    fn empty_input_fails_fast() {
        assert_eq!(Keypair::from_encoded(""), Err(KeyError::InvalidEncoding));
        assert_eq!(Keypair::from_encoded("   "), Err(KeyError::InvalidEncoding));
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert_eq!(
            Keypair::from_encoded("definitely !!! not base64"),
            Err(KeyError::InvalidEncoding)
        );
    }

    #[test]
    fn foreign_scheme_is_rejected() {
        let envelope = KeyEnvelope {
            scheme: KeyScheme::Rsa as i32,
            data: vec![0u8; SECRET_KEY_LENGTH],
        };
        let encoded = BASE64.encode(envelope.encode_to_vec());
        assert_eq!(
            Keypair::from_encoded(&encoded),
            Err(KeyError::UnsupportedScheme(KeyScheme::Rsa as i32))
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        let envelope = KeyEnvelope {
            scheme: KeyScheme::Ed25519 as i32,
            data: vec![0u8; 31],
        };
        let encoded = BASE64.encode(envelope.encode_to_vec());
        assert_eq!(Keypair::from_encoded(&encoded), Err(KeyError::InvalidLength(31)));
    }

    #[test]
    fn mismatched_halves_are_rejected() {
        let keypair = Keypair::generate().unwrap();
        let other = Keypair::generate().unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(&keypair.0.to_bytes());
        data.extend_from_slice(&other.public_key().to_bytes());
        let envelope = KeyEnvelope {
            scheme: KeyScheme::Ed25519 as i32,
            data,
        };
        let encoded = BASE64.encode(envelope.encode_to_vec());
        assert_eq!(
            Keypair::from_encoded(&encoded),
            Err(KeyError::MismatchedKeyHalves)
        );
    }

    #[test]
    fn public_key_envelope_round_trip() {
        let keypair = Keypair::generate().unwrap();
        let envelope = encode_public_key_envelope(&keypair.public_key());
        let recovered = decode_public_key_envelope(&envelope).unwrap();
        assert_eq!(recovered, keypair.public_key());
    }
}
