//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! ECDSA/secp256k1 signing helpers. Wire-level signatures are over the
//! standard Ethereum "personal_sign" envelope around a digest, matching the
//! on-chain verifier this core submits to.

use k256::ecdsa::{signature::hazmat::PrehashVerifier, RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::types::PublicKeyBytes;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("signature is malformed: {0}")]
    MalformedSignature(String),
    #[error("public key could not be recovered from the signature")]
    RecoveryFailed,
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// The standard `"\x19Ethereum Signed Message:\n<len>"` personal-sign envelope.
/// Any deviation breaks wire compatibility with the on-chain verifier.
pub fn text_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut preimage = Vec::with_capacity(prefix.len() + message.len());
    preimage.extend_from_slice(prefix.as_bytes());
    preimage.extend_from_slice(message);
    keccak256(&preimage)
}

fn compress(verifying_key: &VerifyingKey) -> PublicKeyBytes {
    let encoded = verifying_key.to_encoded_point(true);
    let bytes: [u8; 33] = encoded.as_bytes().try_into().expect("compressed point is 33 bytes");
    PublicKeyBytes(bytes)
}

/// Recovers the compressed public key that produced `signature` over `digest`.
/// `signature` is the 65-byte `r || s || v` recoverable ECDSA signature.
pub fn recover_public_key(digest: &[u8; 32], signature: &[u8]) -> Result<PublicKeyBytes, CryptoError> {
    if signature.len() != 65 {
        return Err(CryptoError::MalformedSignature(format!(
            "expected 65 bytes (r || s || v), got {}",
            signature.len()
        )));
    }
    let sig = EcdsaSignature::from_slice(&signature[..64])
        .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    let recovery_byte = signature[64];
    let recovery_id = RecoveryId::from_byte(normalize_recovery_byte(recovery_byte))
        .ok_or_else(|| CryptoError::MalformedSignature("invalid recovery id".to_string()))?;

    let verifying_key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(compress(&verifying_key))
}

/// Accepts both the Ethereum `{27,28}` and raw `{0,1}` recovery-id conventions.
fn normalize_recovery_byte(b: u8) -> u8 {
    if b >= 27 {
        b - 27
    } else {
        b
    }
}

/// Produces a 65-byte `r || s || v` signature over `digest` (`v` in `{0,1}`).
pub fn sign_prehash(signing_key: &SigningKey, digest: &[u8; 32]) -> Vec<u8> {
    let (sig, recid) = signing_key
        .sign_prehash_recoverable(digest)
        .expect("signing a 32-byte digest cannot fail");
    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&sig.to_bytes());
    out.push(recid.to_byte());
    out
}

/// Verifies (non-recovering) that `signature`'s first 64 bytes are a valid
/// ECDSA signature over `digest` under `public_key`. Used only where the
/// caller already knows the claimed signer and wants a cheap sanity check
/// without recovery; the protocol itself authenticates signers by recovery.
pub fn verify_prehash(public_key: &PublicKeyBytes, digest: &[u8; 32], signature: &[u8]) -> Result<bool, CryptoError> {
    if signature.len() < 64 {
        return Err(CryptoError::MalformedSignature("signature shorter than 64 bytes".to_string()));
    }
    let verifying_key = VerifyingKey::from_sec1_bytes(&public_key.0)
        .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    let sig =
        EcdsaSignature::from_slice(&signature[..64]).map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    Ok(verifying_key.verify_prehash(digest, &sig).is_ok())
}
