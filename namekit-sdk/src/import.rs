//!
//! Import policy for user-supplied binary record files.
//!

use namekit_common::identity::Identity;
use namekit_common::record::Record;

use crate::machine::SessionError;

/// Decode a record file and infer the name it binds.
///
/// An embedded public key takes precedence over the file name: the record
/// must verify against it and the canonical name derives from the key.
/// Without one, the file stem is parsed as an identity, which must itself
/// carry the public key needed to validate the signature. Any decoding or
/// validation failure fails the whole import.
pub fn decode_record_file(bytes: &[u8], file_stem: &str) -> Result<(Record, String), SessionError> {
    let record = Record::decode(bytes)?;

    if let Some(public_key) = record.embedded_public_key()? {
        record.verify(&public_key)?;
        let name = Identity::from_public_key(&public_key).to_name();
        return Ok((record, name));
    }

    let identity = Identity::parse(file_stem)
        .map_err(|_| SessionError::NameInference(file_stem.to_string()))?;
    let public_key = identity
        .public_key()
        .ok_or_else(|| SessionError::NameInference(file_stem.to_string()))?;
    record.verify(&public_key)?;
    let name = identity.to_name();
    Ok((record, name))
}
