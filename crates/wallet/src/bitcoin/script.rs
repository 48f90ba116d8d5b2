//! Script templates

/// Duplicate the top stack item
pub const OP_DUP: u8 = 0x76;
/// RIPEMD160 of SHA256 of the top stack item
pub const OP_HASH160: u8 = 0xA9;
/// Compare the top two items
pub const OP_EQUAL: u8 = 0x87;
/// Compare the top two items and fail if they differ
pub const OP_EQUALVERIFY: u8 = 0x88;
/// Check a signature against a public key
pub const OP_CHECKSIG: u8 = 0xAC;
/// Push the next byte as length
pub const OP_PUSHDATA1: u8 = 0x4C;

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    script.extend_from_slice(hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `OP_HASH160 <hash> OP_EQUAL`
pub fn p2sh(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, 20]);
    script.extend_from_slice(hash);
    script.push(OP_EQUAL);
    script
}

/// Append a data push
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        len @ 0..=0x4B => script.push(len as u8),
        len @ 0x4C..=0xFF => script.extend_from_slice(&[OP_PUSHDATA1, len as u8]),
        len => {
            script.push(0x4D);
            script.extend_from_slice(&(len as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

/// Input script spending a P2PKH output: `<signature ‖ sighash type> <public key>`
pub fn signature_script(der_signature: &[u8], sighash_type: u8, public_key: &[u8]) -> Vec<u8> {
    let mut signature = der_signature.to_vec();
    signature.push(sighash_type);

    let mut script = Vec::with_capacity(signature.len() + public_key.len() + 2);
    push_data(&mut script, &signature);
    push_data(&mut script, public_key);
    script
}

/// Hash160 inside a P2PKH script
pub fn p2pkh_hash(script: &[u8]) -> Option<&[u8]> {
    match script {
        [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            Some(hash)
        }
        _ => None,
    }
}
