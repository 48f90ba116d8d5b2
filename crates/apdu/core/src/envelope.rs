//! Session encryption envelope
//!
//! Once a session is established every request and response body is wrapped as
//! `len(2, BE) ‖ CRC16(payload)(2, BE) ‖ payload`, zero-padded to the AES block
//! size and encrypted with AES-256-CBC under the session key and an all-zero IV.
//! Status words always travel in the clear.

use std::fmt;

use aes::Aes256;
use bytes::{BufMut, Bytes, BytesMut};
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, generic_array::GenericArray};
use crc::{CRC_16_ISO_IEC_14443_3_A, Crc};
use tracing::trace;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, FrameIntegrityError};

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Size of the length and CRC header in front of the payload
const HEADER_SIZE: usize = 4;

/// CRC-16/ISO-IEC-14443-3-A as used by the card
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ISO_IEC_14443_3_A);

/// Compute the envelope checksum over a payload
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// 32 byte AES-256 key shared with the card for the duration of a tap
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Wrap raw key material
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw key material
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Wrap a payload in the envelope and encrypt it
    pub fn encrypt(&self, payload: &[u8]) -> Result<Bytes, Error> {
        let len = u16::try_from(payload.len())
            .map_err(|_| Error::InvalidCommandLength(payload.len()))?;

        let padded_len = (HEADER_SIZE + payload.len()).div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        let mut buf = BytesMut::with_capacity(padded_len);
        buf.put_u16(len);
        buf.put_u16(crc16(payload));
        buf.put_slice(payload);
        buf.resize(padded_len, 0);

        let mut encryptor = Encryptor::new(GenericArray::from_slice(&self.0), &Default::default());
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        trace!(
            plain_len = payload.len(),
            encrypted_len = buf.len(),
            "Encrypted envelope"
        );
        Ok(buf.freeze())
    }

    /// Decrypt an envelope and return the payload after checking length and CRC
    pub fn decrypt(&self, data: &[u8]) -> Result<Bytes, FrameIntegrityError> {
        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            return Err(FrameIntegrityError::NotBlockAligned { len: data.len() });
        }

        let mut buf = BytesMut::from(data);
        let mut decryptor = Decryptor::new(GenericArray::from_slice(&self.0), &Default::default());
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        let declared = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        let expected = u16::from_be_bytes([buf[2], buf[3]]);
        let available = buf.len() - HEADER_SIZE;
        if declared > available {
            buf.fill(0);
            return Err(FrameIntegrityError::LengthMismatch {
                declared,
                available,
            });
        }

        let payload = buf.split_off(HEADER_SIZE).split_to(declared);
        let computed = crc16(&payload);
        if computed != expected {
            return Err(FrameIntegrityError::CrcMismatch { expected, computed });
        }

        Ok(payload.freeze())
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}
