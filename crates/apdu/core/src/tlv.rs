//! Tag-length-value codec used in every card request and response
//!
//! A record is a one byte tag, a length and the value. The length is a single
//! byte for values up to 254 bytes; longer values use `0xFF` followed by a
//! big-endian `u16`.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Marker byte announcing a three byte length field
const EXTENDED_LENGTH: u8 = 0xFF;

/// Largest value that still fits a one byte length field
const MAX_SHORT_LENGTH: usize = 254;

/// Errors raised while encoding, decoding or reading TLV records
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    /// A record header or value runs past the end of the buffer
    #[error("Truncated record for tag {tag} at offset {offset}")]
    TruncatedRecord {
        /// Tag of the record being decoded
        tag: Tag,
        /// Offset of the record within the buffer
        offset: usize,
    },

    /// A value is longer than a three byte length field can describe
    #[error("Value for tag {tag} is too long: {len} bytes")]
    ValueTooLong {
        /// Tag of the offending record
        tag: Tag,
        /// Length of the value
        len: usize,
    },

    /// A required tag is absent
    #[error("Missing tag {0}")]
    MissingTag(Tag),

    /// A value cannot be interpreted as the requested type
    #[error("Invalid value for tag {tag}: {reason}")]
    InvalidValue {
        /// Tag of the offending record
        tag: Tag,
        /// What was wrong with it
        reason: &'static str,
    },
}

macro_rules! tags {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)+) => {
        /// Closed set of tags understood by the card
        ///
        /// Any other wire code decodes to [`Tag::Unknown`] instead of failing.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Tag {
            $($(#[$doc])* $name,)+
            /// A tag this implementation does not know about
            Unknown(u8),
        }

        impl Tag {
            /// Wire code of the tag
            pub const fn code(self) -> u8 {
                match self {
                    $(Self::$name => $code,)+
                    Self::Unknown(code) => code,
                }
            }

            /// Map a wire code to a tag
            pub const fn from_code(code: u8) -> Self {
                match code {
                    $($code => Self::$name,)+
                    other => Self::Unknown(other),
                }
            }
        }
    };
}

tags! {
    /// Card identifier (8 bytes)
    CardId = 0x01,
    /// Card status byte
    Status = 0x02,
    /// Card public key (uncompressed secp256k1)
    CardPublicKey = 0x03,
    /// Signature made with the card key
    CardSignature = 0x04,
    /// Curve name of the wallet key
    CurveId = 0x05,
    /// Hash algorithm name
    HashAlgorithm = 0x06,
    /// Allowed signing methods
    SigningMethod = 0x07,
    /// Maximum number of signatures
    MaxSignatures = 0x08,
    /// Security delay applied before PIN2 operations
    PauseBeforePin2 = 0x09,
    /// Settings mask
    SettingsMask = 0x0A,
    /// Chip UID
    Uid = 0x0B,
    /// Nested record with personalisation data
    CardData = 0x0C,
    /// Card health byte
    Health = 0x0F,
    /// SHA-256 of PIN
    Pin = 0x10,
    /// SHA-256 of PIN2
    Pin2 = 0x11,
    /// SHA-256 of the new PIN
    NewPin = 0x12,
    /// SHA-256 of the new PIN2
    NewPin2 = 0x13,
    /// Random challenge chosen by the host
    Challenge = 0x16,
    /// Random salt chosen by the card
    Salt = 0x17,
    /// Number of validations performed by the card
    ValidationCounter = 0x18,
    /// Host half of the session negotiation
    SessionKeyA = 0x1A,
    /// Card half of the session negotiation
    SessionKeyB = 0x1B,
    /// Remaining security delay in units of 10 ms
    Pause = 0x1C,
    /// Manufacturer name
    ManufacturerName = 0x20,
    /// Public key of the issuer data key
    IssuerDataPublicKey = 0x30,
    /// Public key of the issuer transaction key
    IssuerTransactionPublicKey = 0x31,
    /// Issuer data
    IssuerData = 0x32,
    /// Issuer signature over the issuer data
    IssuerDataSignature = 0x33,
    /// Issuer co-signature over the hashes to sign
    IssuerTransactionSignature = 0x34,
    /// Issuer data counter
    IssuerDataCounter = 0x35,
    /// First code page to hash
    CodePageAddress = 0x40,
    /// Number of code pages to hash
    CodePageCount = 0x41,
    /// Hash of the requested code pages
    CodeHash = 0x42,
    /// Concatenated hashes to sign
    TransactionOutHash = 0x50,
    /// Length of every hash to sign
    TransactionOutHashSize = 0x51,
    /// Raw payload to sign
    TransactionOutRaw = 0x52,
    /// Wallet public key
    WalletPublicKey = 0x60,
    /// Concatenated wallet signatures
    WalletSignature = 0x61,
    /// Remaining wallet signatures
    WalletRemainingSignatures = 0x62,
    /// Number of hashes signed by the wallet
    WalletSignedHashes = 0x63,
    /// Firmware version string
    Firmware = 0x80,
    /// Batch identifier
    Batch = 0x81,
    /// Manufacture date and time
    ManufactureDateTime = 0x82,
    /// Issuer name
    IssuerName = 0x83,
    /// Blockchain name
    BlockchainName = 0x84,
    /// Manufacturer signature over the card data
    ManufacturerSignature = 0x86,
    /// Token symbol
    TokenSymbol = 0xA0,
    /// Token contract address
    TokenContractAddress = 0xA1,
    /// Token decimal places
    TokenDecimal = 0xA2,
}

impl From<u8> for Tag {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> Self {
        tag.code()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({code:#04x})"),
            known => write!(f, "{known:?}({:#04x})", known.code()),
        }
    }
}

/// A single tag-length-value record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    tag: Tag,
    value: Bytes,
}

impl Tlv {
    /// Create a record
    pub fn new(tag: Tag, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Tag of the record
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    /// Value of the record
    pub const fn value(&self) -> &Bytes {
        &self.value
    }

    fn encoded_len(&self) -> usize {
        let header = if self.value.len() > MAX_SHORT_LENGTH {
            4
        } else {
            2
        };
        header + self.value.len()
    }
}

/// Ordered list of TLV records
///
/// Lookups return the first record carrying the requested tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvList(Vec<Tlv>);

impl TlvList {
    /// Create an empty list
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder method appending a record
    pub fn with(mut self, tag: Tag, value: impl AsRef<[u8]>) -> Self {
        self.push(tag, value);
        self
    }

    /// Builder method appending a record only when a value is present
    pub fn with_opt(mut self, tag: Tag, value: Option<impl AsRef<[u8]>>) -> Self {
        self.push_opt(tag, value);
        self
    }

    /// Append a record
    pub fn push(&mut self, tag: Tag, value: impl AsRef<[u8]>) {
        self.0
            .push(Tlv::new(tag, Bytes::copy_from_slice(value.as_ref())));
    }

    /// Append a record when a value is present
    pub fn push_opt(&mut self, tag: Tag, value: Option<impl AsRef<[u8]>>) {
        if let Some(value) = value {
            self.push(tag, value);
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list holds no records
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the records in order
    pub fn iter(&self) -> impl Iterator<Item = &Tlv> {
        self.0.iter()
    }

    /// First record with the given tag
    pub fn get(&self, tag: Tag) -> Option<&Tlv> {
        self.0.iter().find(|tlv| tlv.tag == tag)
    }

    /// Value of the first record with the given tag
    pub fn value(&self, tag: Tag) -> Option<&Bytes> {
        self.get(tag).map(Tlv::value)
    }

    /// Value of a tag that must be present
    pub fn required(&self, tag: Tag) -> Result<&Bytes, TlvError> {
        self.value(tag).ok_or(TlvError::MissingTag(tag))
    }

    /// Big-endian unsigned integer of one to four bytes
    pub fn uint(&self, tag: Tag) -> Result<Option<u32>, TlvError> {
        self.value(tag).map(|value| parse_uint(tag, value)).transpose()
    }

    /// Single byte value
    pub fn u8(&self, tag: Tag) -> Result<Option<u8>, TlvError> {
        match self.value(tag) {
            None => Ok(None),
            Some(value) if value.len() == 1 => Ok(Some(value[0])),
            Some(_) => Err(TlvError::InvalidValue {
                tag,
                reason: "expected a single byte",
            }),
        }
    }

    /// Big-endian unsigned integer that must be present
    pub fn required_uint(&self, tag: Tag) -> Result<u32, TlvError> {
        parse_uint(tag, self.required(tag)?)
    }

    /// UTF-8 string value
    pub fn string(&self, tag: Tag) -> Result<Option<String>, TlvError> {
        self.value(tag)
            .map(|value| {
                std::str::from_utf8(value)
                    .map(|s| s.trim_end_matches('\0').to_string())
                    .map_err(|_| TlvError::InvalidValue {
                        tag,
                        reason: "not valid UTF-8",
                    })
            })
            .transpose()
    }

    /// Value rendered as upper-case hex
    pub fn hex(&self, tag: Tag) -> Option<String> {
        self.value(tag).map(hex::encode_upper)
    }

    /// Value decoded as a nested TLV list
    pub fn nested(&self, tag: Tag) -> Result<Option<Self>, TlvError> {
        self.value(tag).map(|value| Self::decode(value)).transpose()
    }

    /// Serialize the records in order
    pub fn encode(&self) -> Result<Bytes, TlvError> {
        let capacity = self.0.iter().map(Tlv::encoded_len).sum();
        let mut buf = BytesMut::with_capacity(capacity);

        for tlv in &self.0 {
            let len = tlv.value.len();
            buf.put_u8(tlv.tag.code());
            if len > MAX_SHORT_LENGTH {
                let len = u16::try_from(len).map_err(|_| TlvError::ValueTooLong {
                    tag: tlv.tag,
                    len,
                })?;
                buf.put_u8(EXTENDED_LENGTH);
                buf.put_u16(len);
            } else {
                buf.put_u8(len as u8);
            }
            buf.put_slice(&tlv.value);
        }

        Ok(buf.freeze())
    }

    /// Parse a buffer into records
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let mut records = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            let start = offset;
            let tag = Tag::from_code(data[offset]);
            offset += 1;

            let truncated = TlvError::TruncatedRecord { tag, offset: start };

            let mut len = *data.get(offset).ok_or_else(|| truncated.clone())? as usize;
            offset += 1;

            if len == EXTENDED_LENGTH as usize {
                let bytes = data.get(offset..offset + 2).ok_or_else(|| truncated.clone())?;
                len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
                offset += 2;
            }

            let value = data.get(offset..offset + len).ok_or(truncated)?;
            offset += len;

            if let Tag::Unknown(code) = tag {
                trace!("Decoded unknown tag {code:#04x}");
            }
            records.push(Tlv::new(tag, Bytes::copy_from_slice(value)));
        }

        Ok(Self(records))
    }
}

impl FromIterator<Tlv> for TlvList {
    fn from_iter<I: IntoIterator<Item = Tlv>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for TlvList {
    type Item = Tlv;
    type IntoIter = std::vec::IntoIter<Tlv>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn parse_uint(tag: Tag, value: &[u8]) -> Result<u32, TlvError> {
    if value.is_empty() || value.len() > 4 {
        return Err(TlvError::InvalidValue {
            tag,
            reason: "integer must be 1 to 4 bytes",
        });
    }
    Ok(value.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_codes_are_total() {
        for code in 0..=u8::MAX {
            assert_eq!(Tag::from_code(code).code(), code);
        }
        assert_eq!(Tag::from_code(0x01), Tag::CardId);
        assert_eq!(Tag::from_code(0x7E), Tag::Unknown(0x7E));
    }

    #[test]
    fn test_encode_short_and_extended_lengths() {
        let list = TlvList::new()
            .with(Tag::Pin, [0xAA; 3])
            .with(Tag::IssuerData, vec![0x55; 254])
            .with(Tag::TransactionOutRaw, vec![0x11; 255]);
        let encoded = list.encode().unwrap();

        assert_eq!(&encoded[..5], &[0x10, 0x03, 0xAA, 0xAA, 0xAA]);
        assert_eq!(&encoded[5..7], &[0x32, 0xFE]);
        let extended = 5 + 2 + 254;
        assert_eq!(
            &encoded[extended..extended + 4],
            &[0x52, 0xFF, 0x00, 0xFF]
        );
        assert_eq!(encoded.len(), extended + 4 + 255);
    }

    #[test]
    fn test_round_trip() {
        let list = TlvList::new()
            .with(Tag::CardId, hex::decode("CB22000000029389").unwrap())
            .with(Tag::Status, [0x02])
            .with(Tag::Unknown(0x7E), [0u8; 0])
            .with(Tag::WalletSignature, vec![0x42; 640])
            .with(Tag::Status, [0x03]);

        let decoded = TlvList::decode(&list.encode().unwrap()).unwrap();
        assert_eq!(decoded, list);
        // First match wins
        assert_eq!(decoded.value(Tag::Status).unwrap().as_ref(), &[0x02]);
    }

    #[test]
    fn test_decode_truncated() {
        // Declared length runs past the buffer
        assert_eq!(
            TlvList::decode(&[0x01, 0x08, 0xCB, 0x22]),
            Err(TlvError::TruncatedRecord {
                tag: Tag::CardId,
                offset: 0
            })
        );
        // Missing length byte
        assert!(matches!(
            TlvList::decode(&[0x02, 0x01, 0x02, 0x10]),
            Err(TlvError::TruncatedRecord { tag: Tag::Pin, offset: 3 })
        ));
        // Extended length cut short
        assert!(TlvList::decode(&[0x52, 0xFF, 0x01]).is_err());
    }

    #[test]
    fn test_unknown_tags_are_tolerated() {
        let decoded = TlvList::decode(&[0x7E, 0x01, 0x00, 0x02, 0x01, 0x02]).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.iter().next().unwrap().tag(), Tag::Unknown(0x7E));
        assert_eq!(decoded.uint(Tag::Status).unwrap(), Some(2));
    }

    #[test]
    fn test_typed_accessors() {
        let nested = TlvList::new().with(Tag::Batch, b"0017").encode().unwrap();
        let list = TlvList::new()
            .with(Tag::MaxSignatures, [0x00, 0x01, 0x86, 0xA0])
            .with(Tag::Firmware, b"1.21c\0")
            .with(Tag::CardData, nested)
            .with(Tag::Health, [0u8; 0]);

        assert_eq!(list.uint(Tag::MaxSignatures).unwrap(), Some(100_000));
        assert_eq!(list.string(Tag::Firmware).unwrap().as_deref(), Some("1.21c"));
        assert_eq!(
            list.nested(Tag::CardData)
                .unwrap()
                .unwrap()
                .string(Tag::Batch)
                .unwrap()
                .as_deref(),
            Some("0017")
        );
        assert!(matches!(
            list.uint(Tag::Health),
            Err(TlvError::InvalidValue { tag: Tag::Health, .. })
        ));
        assert_eq!(list.required(Tag::Pin), Err(TlvError::MissingTag(Tag::Pin)));
        assert_eq!(list.uint(Tag::Pin).unwrap(), None);
    }
}
