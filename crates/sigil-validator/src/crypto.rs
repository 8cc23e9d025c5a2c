//! Cryptographic backend: algorithm support tables, DS digests and
//! signature verification.
//!
//! DNSSEC stores RSA keys as exponent-length ‖ exponent ‖ modulus, ECDSA
//! keys as the raw uncompressed point without the SEC1 prefix, and ECDSA
//! signatures as raw r‖s. Some signers emit DER-encoded ECDSA signatures
//! instead; those are detected by length and converted before
//! verification.

use sigil_proto::rdata::{DNSKEY, DS};
use sigil_proto::Name;
use bytes::BytesMut;
use sha2::Digest;
use thiserror::Error;

/// Errors from the cryptographic backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The signing algorithm is not implemented.
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(u8),

    /// The DS digest type is not implemented.
    #[error("unsupported digest type {0}")]
    UnsupportedDigest(u8),

    /// The public key material could not be used.
    #[error("invalid public key: {0}")]
    InvalidKey(&'static str),

    /// The signature did not verify.
    #[error("signature verification failed")]
    VerifyFailed,
}

/// Result alias for backend operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// DNSSEC signing algorithms the backend can verify (RFC 8624).
///
/// DSA (3, 6) and GOST (12) are deliberately absent: RFC 8624 forbids
/// validating with them, so DS sets referencing only such algorithms read
/// as insecure delegations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Algorithm {
    /// RSA/SHA-1 (5). Deprecated but still deployed.
    RsaSha1 = 5,
    /// RSA/SHA-1 with NSEC3 (7).
    RsaSha1Nsec3Sha1 = 7,
    /// RSA/SHA-256 (8).
    RsaSha256 = 8,
    /// RSA/SHA-512 (10).
    RsaSha512 = 10,
    /// ECDSA P-256 with SHA-256 (13).
    EcdsaP256Sha256 = 13,
    /// ECDSA P-384 with SHA-384 (14).
    EcdsaP384Sha384 = 14,
    /// Ed25519 (15).
    Ed25519 = 15,
}

impl Algorithm {
    /// Creates an `Algorithm` from its IANA number.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            5 => Some(Self::RsaSha1),
            7 => Some(Self::RsaSha1Nsec3Sha1),
            8 => Some(Self::RsaSha256),
            10 => Some(Self::RsaSha512),
            13 => Some(Self::EcdsaP256Sha256),
            14 => Some(Self::EcdsaP384Sha384),
            15 => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// Returns the expected raw signature size in bytes, where fixed.
    pub const fn raw_signature_len(self) -> Option<usize> {
        match self {
            Self::EcdsaP256Sha256 | Self::Ed25519 => Some(64),
            Self::EcdsaP384Sha384 => Some(96),
            _ => None,
        }
    }
}

/// Returns true if the algorithm number can be verified by this backend.
pub fn algorithm_supported(algorithm: u8) -> bool {
    Algorithm::from_u8(algorithm).is_some()
}

/// Returns true if the DS digest type can be computed by this backend.
pub fn digest_supported(digest_type: u8) -> bool {
    matches!(digest_type, 1 | 2 | 4)
}

/// Computes the DS digest over `owner ‖ DNSKEY RDATA` (RFC 4034
/// Section 5.1.4). The owner name is canonicalized first.
pub fn ds_digest(owner: &Name, key: &DNSKEY, digest_type: u8) -> Result<Vec<u8>> {
    let mut data = BytesMut::new();
    owner.write_canonical(&mut data);
    key.write_to(&mut data);

    match digest_type {
        1 => {
            let mut h = sha1::Sha1::new();
            h.update(&data);
            Ok(h.finalize().to_vec())
        }
        2 => {
            let mut h = sha2::Sha256::new();
            h.update(&data);
            Ok(h.finalize().to_vec())
        }
        4 => {
            let mut h = sha2::Sha384::new();
            h.update(&data);
            Ok(h.finalize().to_vec())
        }
        other => Err(CryptoError::UnsupportedDigest(other)),
    }
}

/// Checks whether a DS record commits to the given DNSKEY.
pub fn ds_matches_key(owner: &Name, ds: &DS, key: &DNSKEY) -> bool {
    if ds.key_tag != key.key_tag() || ds.algorithm != key.algorithm {
        return false;
    }
    match ds_digest(owner, key, ds.digest_type) {
        Ok(digest) => digest == ds.digest,
        Err(_) => false,
    }
}

/// Returns the effective key size in bits, used by the NSEC3 iteration
/// policy table.
pub fn key_bits(key: &DNSKEY) -> Option<u16> {
    match Algorithm::from_u8(key.algorithm)? {
        Algorithm::RsaSha1
        | Algorithm::RsaSha1Nsec3Sha1
        | Algorithm::RsaSha256
        | Algorithm::RsaSha512 => {
            let (_, modulus) = split_rsa_key(&key.public_key).ok()?;
            let stripped = modulus.iter().skip_while(|&&b| b == 0).count();
            u16::try_from(stripped * 8).ok()
        }
        Algorithm::EcdsaP256Sha256 | Algorithm::Ed25519 => Some(256),
        Algorithm::EcdsaP384Sha384 => Some(384),
    }
}

/// Verifies `signature` over `data` with the given DNSKEY.
pub fn verify(key: &DNSKEY, data: &[u8], signature: &[u8]) -> Result<()> {
    let algorithm = Algorithm::from_u8(key.algorithm)
        .ok_or(CryptoError::UnsupportedAlgorithm(key.algorithm))?;

    match algorithm {
        Algorithm::RsaSha1 | Algorithm::RsaSha1Nsec3Sha1 => verify_rsa(
            &key.public_key,
            data,
            signature,
            &ring::signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
        ),
        Algorithm::RsaSha256 => verify_rsa(
            &key.public_key,
            data,
            signature,
            // The legacy lower bound keeps 1024-bit zone keys verifiable.
            &ring::signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY,
        ),
        Algorithm::RsaSha512 => verify_rsa(
            &key.public_key,
            data,
            signature,
            &ring::signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY,
        ),
        Algorithm::EcdsaP256Sha256 => verify_p256(&key.public_key, data, signature),
        Algorithm::EcdsaP384Sha384 => verify_p384(&key.public_key, data, signature),
        Algorithm::Ed25519 => verify_ed25519(&key.public_key, data, signature),
    }
}

/// Splits a DNSKEY RSA public key into (exponent, modulus)
/// (RFC 3110 Section 2).
fn split_rsa_key(public_key: &[u8]) -> Result<(&[u8], &[u8])> {
    let first = *public_key.first().ok_or(CryptoError::InvalidKey("empty"))?;

    let (exp_len, exp_offset) = if first == 0 {
        if public_key.len() < 3 {
            return Err(CryptoError::InvalidKey("truncated exponent length"));
        }
        (
            u16::from_be_bytes([public_key[1], public_key[2]]) as usize,
            3,
        )
    } else {
        (first as usize, 1)
    };

    if public_key.len() <= exp_offset + exp_len {
        return Err(CryptoError::InvalidKey("truncated key"));
    }

    Ok((
        &public_key[exp_offset..exp_offset + exp_len],
        &public_key[exp_offset + exp_len..],
    ))
}

fn verify_rsa(
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
    params: &'static ring::signature::RsaParameters,
) -> Result<()> {
    let (exponent, modulus) = split_rsa_key(public_key)?;
    let der = rsa_public_key_der(modulus, exponent);

    ring::signature::UnparsedPublicKey::new(params, &der)
        .verify(data, signature)
        .map_err(|_| CryptoError::VerifyFailed)
}

/// Encodes an RSAPublicKey ASN.1 DER structure from modulus and exponent.
fn rsa_public_key_der(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    fn der_len(len: usize) -> Vec<u8> {
        if len < 128 {
            vec![len as u8]
        } else if len < 256 {
            vec![0x81, len as u8]
        } else {
            vec![0x82, (len >> 8) as u8, len as u8]
        }
    }

    fn der_integer(data: &[u8]) -> Vec<u8> {
        let pad = data.first().is_some_and(|&b| b & 0x80 != 0);
        let mut out = vec![0x02];
        out.extend(der_len(data.len() + usize::from(pad)));
        if pad {
            out.push(0x00);
        }
        out.extend_from_slice(data);
        out
    }

    let n = der_integer(modulus);
    let e = der_integer(exponent);

    let mut seq = vec![0x30];
    seq.extend(der_len(n.len() + e.len()));
    seq.extend(n);
    seq.extend(e);
    seq
}

/// Converts a possibly DER-encoded ECDSA signature to raw r‖s form.
///
/// DNSSEC signatures are raw; a signature longer than the expected raw
/// size is treated as DER and decoded. This replaces the raw/DER patch-up
/// the engine would otherwise need per signer quirk.
fn normalize_ecdsa<'a, F>(signature: &'a [u8], raw_len: usize, from_der: F) -> Result<Vec<u8>>
where
    F: Fn(&[u8]) -> Option<Vec<u8>>,
{
    if signature.len() == raw_len {
        return Ok(signature.to_vec());
    }
    if signature.len() > raw_len {
        if let Some(raw) = from_der(signature) {
            return Ok(raw);
        }
    }
    Err(CryptoError::VerifyFailed)
}

fn verify_p256(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::{Signature, VerifyingKey};

    if public_key.len() != 64 {
        return Err(CryptoError::InvalidKey("P-256 key must be 64 bytes"));
    }

    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(public_key);

    let verifying_key = VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|_| CryptoError::InvalidKey("invalid P-256 point"))?;

    let raw = normalize_ecdsa(signature, 64, |der| {
        Signature::from_der(der).ok().map(|s| s.to_bytes().to_vec())
    })?;
    let sig = Signature::from_slice(&raw).map_err(|_| CryptoError::VerifyFailed)?;

    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::VerifyFailed)
}

fn verify_p384(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    use p384::ecdsa::signature::Verifier;
    use p384::ecdsa::{Signature, VerifyingKey};

    if public_key.len() != 96 {
        return Err(CryptoError::InvalidKey("P-384 key must be 96 bytes"));
    }

    let mut sec1 = Vec::with_capacity(97);
    sec1.push(0x04);
    sec1.extend_from_slice(public_key);

    let verifying_key = VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|_| CryptoError::InvalidKey("invalid P-384 point"))?;

    let raw = normalize_ecdsa(signature, 96, |der| {
        Signature::from_der(der).ok().map(|s| s.to_bytes().to_vec())
    })?;
    let sig = Signature::from_slice(&raw).map_err(|_| CryptoError::VerifyFailed)?;

    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::VerifyFailed)
}

fn verify_ed25519(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("Ed25519 key must be 32 bytes"))?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::VerifyFailed)?;

    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| CryptoError::InvalidKey("invalid Ed25519 key"))?;

    verifying_key
        .verify(data, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| CryptoError::VerifyFailed)
}
