//! The signed record binding an identity to a target value, plus its
//! binary wire codec and file naming for import/export.

use std::time::{SystemTime, UNIX_EPOCH};

use ed25519_dalek::Verifier;
use prost::Message;

use crate::keys::{
    decode_public_key_envelope, encode_public_key_envelope, KeyError, Keypair, Signature,
    VerifyingKey,
};

/// File extension of exported binary record files.
pub const RECORD_FILE_EXTENSION: &str = "name-record";

/// Error decoding or validating a record.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The bytes do not decode to a record.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// The record's signature does not verify against the public key.
    #[error("the record's signature does not match the public key")]
    InvalidSignature,

    /// The embedded key envelope is unusable.
    #[error(transparent)]
    EmbeddedKey(#[from] KeyError),
}

impl RecordError {
    /// Whether this is a signature-validation failure.
    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, RecordError::InvalidSignature)
    }
}

#[derive(Clone, PartialEq, prost::Message)]
struct RecordWire {
    #[prost(bytes = "vec", tag = "1")]
    value: Vec<u8>,
    #[prost(uint64, tag = "2")]
    sequence: u64,
    #[prost(uint64, tag = "3")]
    validity: u64,
    #[prost(uint64, tag = "4")]
    ttl: u64,
    #[prost(bytes = "vec", optional, tag = "5")]
    public_key: Option<Vec<u8>>,
    #[prost(bytes = "vec", tag = "6")]
    signature: Vec<u8>,
}

/// A signed name record.
///
/// Note that the wire encoding does not carry the name it was published
/// under; that is derived from the publishing key or inferred at import
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Target value the name points at.
    pub value: String,
    /// Monotonic sequence number; a higher sequence supersedes a lower one.
    pub sequence: u64,
    /// Absolute end of the validity window, Unix milliseconds.
    pub validity: u64,
    /// Advisory cache duration for resolvers, milliseconds. Independent of
    /// the validity window.
    pub ttl: u64,
    /// Protobuf key envelope, embedded only when the name alone cannot
    /// recover the key.
    pub public_key: Option<Vec<u8>>,
    /// Ed25519 signature over the record encoded with this field empty.
    pub signature: Vec<u8>,
}

impl Record {
    /// Build and sign a record.
    ///
    /// The validity window closes `lifetime_ms` from now. The public key is
    /// embedded only on request; canonical names already carry it.
    pub fn build(
        keypair: &Keypair,
        value: &str,
        lifetime_ms: u64,
        ttl_ms: u64,
        sequence: u64,
        embed_public_key: bool,
    ) -> Self {
        let mut record = Record {
            value: value.to_string(),
            sequence,
            validity: now_ms().saturating_add(lifetime_ms),
            ttl: ttl_ms,
            public_key: embed_public_key
                .then(|| encode_public_key_envelope(&keypair.public_key())),
            signature: Vec::new(),
        };
        record.signature = keypair.sign(&record.signable_bytes()).to_bytes().to_vec();
        record
    }

    /// Encode to the binary wire format.
    pub fn encode(&self) -> Vec<u8> {
        self.wire(true).encode_to_vec()
    }

    /// Decode from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let wire = RecordWire::decode(bytes).map_err(|e| RecordError::Malformed(e.to_string()))?;
        let value = String::from_utf8(wire.value)
            .map_err(|_| RecordError::Malformed("value is not valid UTF-8".to_string()))?;
        Ok(Record {
            value,
            sequence: wire.sequence,
            validity: wire.validity,
            ttl: wire.ttl,
            public_key: wire.public_key,
            signature: wire.signature,
        })
    }

    /// Verify the embedded signature against `public_key`.
    pub fn verify(&self, public_key: &VerifyingKey) -> Result<(), RecordError> {
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| RecordError::InvalidSignature)?;
        public_key
            .verify(&self.signable_bytes(), &signature)
            .map_err(|_| RecordError::InvalidSignature)
    }

    /// Decode the embedded public key, when one is present.
    pub fn embedded_public_key(&self) -> Result<Option<VerifyingKey>, RecordError> {
        match &self.public_key {
            Some(bytes) => Ok(Some(decode_public_key_envelope(bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether the validity window has closed at `now` (Unix milliseconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.validity <= now
    }

    fn signable_bytes(&self) -> Vec<u8> {
        self.wire(false).encode_to_vec()
    }

    fn wire(&self, with_signature: bool) -> RecordWire {
        RecordWire {
            value: self.value.as_bytes().to_vec(),
            sequence: self.sequence,
            validity: self.validity,
            ttl: self.ttl,
            public_key: self.public_key.clone(),
            signature: if with_signature {
                self.signature.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// File name a record bound to `name` exports under.
pub fn export_file_name(name: &str) -> String {
    format!("{name}.{RECORD_FILE_EXTENSION}")
}
