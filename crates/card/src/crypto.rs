//! Crypto primitives shared by the card protocol and the transaction builders

use k256::{
    PublicKey, SecretKey,
    ecdsa::{
        RecoveryId, Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Rounds of PBKDF2 used to stretch the PIN into the protocol key
pub const PROTOCOL_KEY_ROUNDS: u32 = 50;

/// Length of the random challenges sent to the card
pub const CHALLENGE_SIZE: usize = 16;

/// SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// RIPEMD-160 of SHA-256
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// Hash of a PIN as sent to the card
pub fn pin_hash(pin: &str) -> [u8; 32] {
    sha256(pin.as_bytes())
}

/// Stretch a PIN hash into the protocol key using the device identifier as salt
pub fn derive_protocol_key(pin_hash: &[u8], identifier: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(pin_hash, identifier, PROTOCOL_KEY_ROUNDS, &mut key);
    key
}

/// x-coordinate of the ECDH shared point
pub fn ecdh_secret(secret: &SecretKey, public: &PublicKey) -> [u8; 32] {
    let shared =
        k256::elliptic_curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    out
}

/// Fresh random challenge
pub fn random_challenge() -> [u8; CHALLENGE_SIZE] {
    let mut challenge = [0u8; CHALLENGE_SIZE];
    rand::rng().fill_bytes(&mut challenge);
    challenge
}

/// Move `s` into the lower half of the curve order
///
/// Cards may return either of the two valid `s` values.
pub fn canonicalize(signature: &Signature) -> Signature {
    signature.normalize_s().unwrap_or(*signature)
}

/// Whether `s` already lies in the lower half of the curve order
pub fn is_canonical(signature: &Signature) -> bool {
    signature.normalize_s().is_none()
}

/// Parse a 64 byte `r ‖ s` signature and canonicalize it
pub fn canonical_signature(bytes: &[u8]) -> Result<Signature, k256::ecdsa::Error> {
    Signature::from_slice(bytes).map(|sig| canonicalize(&sig))
}

/// Serialize a signature as 64 bytes `r ‖ s`
pub fn signature_bytes(signature: &Signature) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&signature.to_bytes());
    out
}

/// Recover the public key that produced `signature` over `hash`
///
/// Returns `None` when the recovery id is out of range or no valid point exists
/// for it.
pub fn recover_public_key(
    hash: &[u8; 32],
    signature: &Signature,
    recovery_id: u8,
) -> Option<VerifyingKey> {
    let recovery_id = RecoveryId::from_byte(recovery_id)?;
    VerifyingKey::recover_from_prehash(hash, signature, recovery_id).ok()
}

/// Verify an ECDSA/SHA-256 signature over `message`
///
/// Both roots of `s` are accepted. Malformed keys or signatures verify as false.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = canonical_signature(signature) else {
        return false;
    };
    key.verify(message, &signature).is_ok()
}

/// Sign `message` with ECDSA/SHA-256, as an issuer does for issuer data and
/// transaction co-signatures
pub fn issuer_signature(key: &SigningKey, message: &[u8]) -> [u8; 64] {
    let signature: Signature = key.sign(message);
    signature_bytes(&signature)
}
