//! Parsing and derivation of the public-key-derived names that records
//! bind to.
//!
//! Two textual encodings are accepted: the canonical base36 form (leading
//! `k`, wrapping a versioned key binding) and the legacy bare-base58btc
//! multihash form, recognizable by its first character being `1` or `Q`.

use core::fmt;

use multibase::Base;

use crate::keys::{decode_public_key_envelope, encode_public_key_envelope, Keypair, VerifyingKey};

/// Version byte of the canonical binary name representation.
const BINDING_VERSION: u8 = 0x01;
/// Codec byte marking the bound content as a wrapped public key.
const KEY_CODEC: u8 = 0x72;
/// Multihash code of an identity (inline) digest carrying the full key.
const MULTIHASH_IDENTITY: u8 = 0x00;
/// Multihash code of a sha2-256 digest.
const MULTIHASH_SHA2_256: u8 = 0x12;
const SHA2_256_LEN: usize = 32;

/// Error parsing a textual name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// The text matches neither the canonical nor the legacy name encoding.
    #[error("'{0}' is not a valid name")]
    InvalidFormat(String),
}

/// The canonical binding identity a name resolves to and from.
///
/// Internally this is the multihash both textual encodings wrap. Identity
/// (inline) multihashes carry the full public key and can recover it;
/// legacy sha2-256 names cannot, so a record resolved under one can only
/// be validated if it embeds its key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    multihash: Vec<u8>,
}

impl Identity {
    /// Parse a textual name. Pure, synchronous and side-effect free, so it
    /// doubles as the strict validation step run before any network call.
    pub fn parse(text: &str) -> Result<Self, IdentityError> {
        let invalid = || IdentityError::InvalidFormat(text.to_string());
        let trimmed = text.trim();
        let lead = trimmed.chars().next().ok_or_else(invalid)?;
        if lead == '1' || lead == 'Q' {
            let multihash = Base::Base58Btc.decode(trimmed).map_err(|_| invalid())?;
            return Self::from_multihash(multihash).ok_or_else(invalid);
        }
        let (base, bytes) = multibase::decode(trimmed).map_err(|_| invalid())?;
        if base != Base::Base36Lower
            || bytes.len() < 3
            || bytes[0] != BINDING_VERSION
            || bytes[1] != KEY_CODEC
        {
            return Err(invalid());
        }
        Self::from_multihash(bytes[2..].to_vec()).ok_or_else(invalid)
    }

    /// Derive the identity of `public_key`. Deterministic and injective:
    /// one name per public key.
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        let envelope = encode_public_key_envelope(public_key);
        let mut multihash = Vec::with_capacity(envelope.len() + 2);
        multihash.push(MULTIHASH_IDENTITY);
        multihash.push(envelope.len() as u8);
        multihash.extend_from_slice(&envelope);
        Self { multihash }
    }

    // Lengths are encoded as single-byte varints; every digest this system
    // produces or accepts fits well under 128 bytes.
    fn from_multihash(bytes: Vec<u8>) -> Option<Self> {
        let (&code, rest) = bytes.split_first()?;
        let (&declared, digest) = rest.split_first()?;
        if declared as usize != digest.len() {
            return None;
        }
        match code {
            MULTIHASH_IDENTITY => {}
            MULTIHASH_SHA2_256 if digest.len() == SHA2_256_LEN => {}
            _ => return None,
        }
        Some(Self { multihash: bytes })
    }

    /// Render the canonical base36 name.
    pub fn to_name(&self) -> String {
        let mut bytes = Vec::with_capacity(self.multihash.len() + 2);
        bytes.push(BINDING_VERSION);
        bytes.push(KEY_CODEC);
        bytes.extend_from_slice(&self.multihash);
        multibase::encode(Base::Base36Lower, bytes)
    }

    /// Render the legacy bare-base58btc multihash name.
    pub fn legacy_name(&self) -> String {
        Base::Base58Btc.encode(&self.multihash)
    }

    /// Recover the public key, when the identity carries one.
    ///
    /// Only identity (inline) multihashes wrap the key envelope; legacy
    /// sha2-256 names return `None`.
    pub fn public_key(&self) -> Option<VerifyingKey> {
        if self.multihash.first() != Some(&MULTIHASH_IDENTITY) {
            return None;
        }
        decode_public_key_envelope(&self.multihash[2..]).ok()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_name())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.to_name()).finish()
    }
}

/// The canonical name of the keypair's identity, or the empty string when
/// no keypair is supplied. Never fails.
pub fn name_from_keypair(keypair: Option<&Keypair>) -> String {
    keypair
        .map(|kp| Identity::from_public_key(&kp.public_key()).to_name())
        .unwrap_or_default()
}
