//! Hashing, signing, and address encoding.
//!
//! This is the only module that touches the underlying curve library; the
//! rest of the workspace consumes raw byte arrays and the free functions
//! here. Hashes are SHA-256, keys and signatures are ed25519, addresses are
//! base58-encoded public keys.

use {
    crate::defs::{Hash32, PublicKey, SignatureBytes},
    ed25519_dalek::{SecretKey, Signature, Signer, Verifier},
    rand::RngCore,
    sha2::{Digest, Sha256},
    thiserror::Error,
};

// Downstream crates handle keypairs through this module alone.
pub use ed25519_dalek::Keypair;

/// Errors from key handling and signature verification.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The byte slice is not a valid key or signature encoding.
    #[error("malformed key material: {0}")]
    Malformed(String),

    /// The signature does not verify against the message and public key.
    #[error("signature verification failed")]
    BadSignature,
}

/// SHA-256 of a byte slice.
pub fn hash(data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over a sequence of slices, hashed as one concatenated message.
pub fn hashv(slices: &[&[u8]]) -> Hash32 {
    let mut hasher = Sha256::new();
    for s in slices {
        hasher.update(s);
    }
    hasher.finalize().into()
}

/// Deterministically derive a keypair from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> Result<Keypair, CryptoError> {
    let secret =
        SecretKey::from_bytes(seed).map_err(|e| CryptoError::Malformed(e.to_string()))?;
    let public = ed25519_dalek::PublicKey::from(&secret);
    Ok(Keypair { secret, public })
}

/// Generate a fresh keypair from OS randomness.
pub fn generate_keypair() -> Keypair {
    let mut seed = [0u8; 32];
    rand::rng().fill_bytes(&mut seed);
    // A freshly drawn 32-byte seed is always a valid ed25519 secret.
    keypair_from_seed(&seed).unwrap()
}

/// The raw public-key bytes of a keypair.
pub fn public_key_bytes(keypair: &Keypair) -> PublicKey {
    keypair.public.to_bytes()
}

/// Sign a message, returning the raw 64-byte signature.
pub fn sign(keypair: &Keypair, message: &[u8]) -> SignatureBytes {
    keypair.sign(message).to_bytes()
}

/// Verify a raw signature against a message and raw public key.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &SignatureBytes) -> bool {
    let Ok(pk) = ed25519_dalek::PublicKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = Signature::try_from(&signature[..]) else {
        return false;
    };
    pk.verify(message, &sig).is_ok()
}

/// Base58 address form of a public key.
pub fn address(public_key: &PublicKey) -> String {
    bs58::encode(public_key).into_string()
}

/// Decode a base58 address back into raw public-key bytes.
pub fn decode_address(addr: &str) -> Result<PublicKey, CryptoError> {
    let bytes = bs58::decode(addr)
        .into_vec()
        .map_err(|e| CryptoError::Malformed(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::Malformed(format!("address is not 32 bytes: {addr}")))
}
