//! The card record produced by Read and updated by later commands

use std::fmt;

use bytes::Bytes;
use tapsign_apdu_core::{Tag, TlvError, TlvList};

/// Lifecycle state of the card's wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CardStatus {
    /// Not yet personalized by the manufacturer
    NotPersonalized,
    /// Personalized, no wallet key
    Empty,
    /// Wallet key present
    Loaded,
    /// Wallet key destroyed
    Purged,
}

impl CardStatus {
    /// Wire code of the status
    pub const fn code(self) -> u8 {
        match self {
            Self::NotPersonalized => 0,
            Self::Empty => 1,
            Self::Loaded => 2,
            Self::Purged => 3,
        }
    }

    /// Map a wire code to a status
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::NotPersonalized),
            1 => Some(Self::Empty),
            2 => Some(Self::Loaded),
            3 => Some(Self::Purged),
            _ => None,
        }
    }

    pub(crate) fn from_tlv(tlv: &TlvList) -> Result<Self, TlvError> {
        let code = tlv.required_uint(Tag::Status)?;
        u8::try_from(code)
            .ok()
            .and_then(Self::from_code)
            .ok_or(TlvError::InvalidValue {
                tag: Tag::Status,
                reason: "unknown card status",
            })
    }
}

/// How the card is allowed to sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SigningMethod {
    /// Sign hashes
    SignHash,
    /// Sign a raw payload
    SignRaw,
    /// Sign hashes co-signed by the issuer
    SignHashValidatedByIssuer,
    /// Sign a raw payload co-signed by the issuer
    SignRawValidatedByIssuer,
    /// Sign hashes co-signed by the issuer and update issuer data
    SignHashValidatedByIssuerAndWriteIssuerData,
    /// Sign a raw payload co-signed by the issuer and update issuer data
    SignRawValidatedByIssuerAndWriteIssuerData,
    /// Point-of-sale signing
    SignPos,
}

impl SigningMethod {
    /// Every method, in code order
    pub const ALL: [Self; 7] = [
        Self::SignHash,
        Self::SignRaw,
        Self::SignHashValidatedByIssuer,
        Self::SignRawValidatedByIssuer,
        Self::SignHashValidatedByIssuerAndWriteIssuerData,
        Self::SignRawValidatedByIssuerAndWriteIssuerData,
        Self::SignPos,
    ];

    /// Method code
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Map a method code to a method
    pub const fn from_code(code: u8) -> Option<Self> {
        if (code as usize) < Self::ALL.len() {
            Some(Self::ALL[code as usize])
        } else {
            None
        }
    }

    /// Whether the method signs a raw payload rather than hashes
    pub const fn signs_raw(self) -> bool {
        matches!(
            self,
            Self::SignRaw
                | Self::SignRawValidatedByIssuer
                | Self::SignRawValidatedByIssuerAndWriteIssuerData
        )
    }

    /// Whether the method needs an issuer co-signature
    pub const fn requires_issuer_signature(self) -> bool {
        matches!(
            self,
            Self::SignHashValidatedByIssuer
                | Self::SignRawValidatedByIssuer
                | Self::SignHashValidatedByIssuerAndWriteIssuerData
                | Self::SignRawValidatedByIssuerAndWriteIssuerData
        )
    }

    /// Whether the method needs an issuer data update
    pub const fn requires_issuer_data(self) -> bool {
        matches!(
            self,
            Self::SignHashValidatedByIssuerAndWriteIssuerData
                | Self::SignRawValidatedByIssuerAndWriteIssuerData
        )
    }
}

/// Set of allowed signing methods, as encoded in one byte
///
/// With bit 7 clear the byte is a single method code. With bit 7 set bits 0..6
/// form a mask of allowed methods.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SigningMethods(u8);

impl SigningMethods {
    const MASK_FLAG: u8 = 0x80;

    /// Wrap the raw byte
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw byte
    pub const fn byte(self) -> u8 {
        self.0
    }

    /// A set holding one method
    pub const fn single(method: SigningMethod) -> Self {
        Self(method.code())
    }

    /// A set holding several methods
    pub fn mask(methods: &[SigningMethod]) -> Self {
        Self(
            methods
                .iter()
                .fold(Self::MASK_FLAG, |acc, m| acc | (1 << m.code())),
        )
    }

    /// Whether `method` is allowed
    pub const fn contains(self, method: SigningMethod) -> bool {
        if self.0 & Self::MASK_FLAG != 0 {
            self.0 & (1 << method.code()) != 0
        } else {
            self.0 == method.code()
        }
    }

    /// Allowed methods in code order
    pub fn iter(self) -> impl Iterator<Item = SigningMethod> {
        SigningMethod::ALL
            .into_iter()
            .filter(move |m| self.contains(*m))
    }
}

impl fmt::Debug for SigningMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Manufacture date carried in the card data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufactureDate {
    /// Year
    pub year: u16,
    /// Month, 1 based
    pub month: u8,
    /// Day of month
    pub day: u8,
}

impl fmt::Display for ManufactureDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Personalisation data nested under [`Tag::CardData`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardData {
    /// Production batch
    pub batch: Option<String>,
    /// Manufacture date
    pub manufacture_date: Option<ManufactureDate>,
    /// Issuer name
    pub issuer_name: Option<String>,
    /// Blockchain the card was issued for
    pub blockchain_name: Option<String>,
    /// Token symbol for token cards
    pub token_symbol: Option<String>,
    /// Token contract address for token cards
    pub token_contract_address: Option<String>,
    /// Token decimal places for token cards
    pub token_decimals: Option<u8>,
    /// Manufacturer signature over the card data
    pub manufacturer_signature: Option<Bytes>,
}

impl CardData {
    /// Parse the nested card data records
    pub fn from_tlv(tlv: &TlvList) -> Result<Self, TlvError> {
        let manufacture_date = match tlv.value(Tag::ManufactureDateTime) {
            Some(value) if value.len() >= 4 => Some(ManufactureDate {
                year: u16::from_be_bytes([value[0], value[1]]),
                month: value[2],
                day: value[3],
            }),
            Some(_) => {
                return Err(TlvError::InvalidValue {
                    tag: Tag::ManufactureDateTime,
                    reason: "expected at least 4 bytes",
                });
            }
            None => None,
        };

        Ok(Self {
            batch: tlv.hex(Tag::Batch),
            manufacture_date,
            issuer_name: tlv.string(Tag::IssuerName)?,
            blockchain_name: tlv.string(Tag::BlockchainName)?,
            token_symbol: tlv.string(Tag::TokenSymbol)?,
            token_contract_address: tlv.string(Tag::TokenContractAddress)?,
            token_decimals: tlv.u8(Tag::TokenDecimal)?,
            manufacturer_signature: tlv.value(Tag::ManufacturerSignature).cloned(),
        })
    }
}

/// Everything known about the card in the field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecord {
    /// Card identifier
    pub card_id: Bytes,
    /// Wallet lifecycle state
    pub status: CardStatus,
    /// Firmware version string
    pub firmware: Option<String>,
    /// Manufacturer name
    pub manufacturer_name: Option<String>,
    /// Card key, used to check card authenticity
    pub card_public_key: Option<Bytes>,
    /// Wallet key
    pub wallet_public_key: Option<Bytes>,
    /// Curve of the wallet key
    pub curve: Option<String>,
    /// Allowed signing methods
    pub signing_methods: Option<SigningMethods>,
    /// Signatures the wallet may make over its lifetime
    pub max_signatures: Option<u32>,
    /// Signatures left
    pub remaining_signatures: Option<u32>,
    /// Hashes signed so far
    pub signed_hashes: Option<u32>,
    /// Security delay before PIN2 operations, in units of 10 ms
    pub pause_before_pin2: Option<u32>,
    /// Settings mask
    pub settings_mask: Option<u32>,
    /// Health byte
    pub health: Option<u8>,
    /// Personalisation data
    pub card_data: Option<CardData>,
    /// Key the issuer signs issuer data with
    pub issuer_data_public_key: Option<Bytes>,
    /// Key the issuer co-signs transactions with
    pub issuer_transaction_public_key: Option<Bytes>,

    /// Outcome of VerifyCard
    pub card_verified: Option<bool>,
    /// Outcome of CheckWallet
    pub wallet_verified: Option<bool>,
    /// Outcome of VerifyCode
    pub code_verified: Option<bool>,
    /// Outcome of ValidateCard
    pub card_validated: Option<bool>,
    /// Whether the last PIN2 gated command ran with the default PIN2
    pub pin2_default: Option<bool>,
}

impl CardRecord {
    /// Record holding only an identifier and a status, for cards known from
    /// elsewhere
    pub fn new(card_id: Bytes, status: CardStatus) -> Self {
        Self {
            card_id,
            status,
            firmware: None,
            manufacturer_name: None,
            card_public_key: None,
            wallet_public_key: None,
            curve: None,
            signing_methods: None,
            max_signatures: None,
            remaining_signatures: None,
            signed_hashes: None,
            pause_before_pin2: None,
            settings_mask: None,
            health: None,
            card_data: None,
            issuer_data_public_key: None,
            issuer_transaction_public_key: None,
            card_verified: None,
            wallet_verified: None,
            code_verified: None,
            card_validated: None,
            pin2_default: None,
        }
    }

    /// Build the record from a Read response
    pub fn from_tlv(tlv: &TlvList) -> Result<Self, TlvError> {
        Ok(Self {
            card_id: tlv.required(Tag::CardId)?.clone(),
            status: CardStatus::from_tlv(tlv)?,
            firmware: tlv.string(Tag::Firmware)?,
            manufacturer_name: tlv.string(Tag::ManufacturerName)?,
            card_public_key: tlv.value(Tag::CardPublicKey).cloned(),
            wallet_public_key: tlv.value(Tag::WalletPublicKey).cloned(),
            curve: tlv.string(Tag::CurveId)?,
            signing_methods: tlv.u8(Tag::SigningMethod)?.map(SigningMethods::from_byte),
            max_signatures: tlv.uint(Tag::MaxSignatures)?,
            remaining_signatures: tlv.uint(Tag::WalletRemainingSignatures)?,
            signed_hashes: tlv.uint(Tag::WalletSignedHashes)?,
            pause_before_pin2: tlv.uint(Tag::PauseBeforePin2)?,
            settings_mask: tlv.uint(Tag::SettingsMask)?,
            health: tlv.u8(Tag::Health)?,
            card_data: tlv
                .nested(Tag::CardData)?
                .map(|nested| CardData::from_tlv(&nested))
                .transpose()?,
            issuer_data_public_key: tlv.value(Tag::IssuerDataPublicKey).cloned(),
            issuer_transaction_public_key: tlv.value(Tag::IssuerTransactionPublicKey).cloned(),
            card_verified: None,
            wallet_verified: None,
            code_verified: None,
            card_validated: None,
            pin2_default: None,
        })
    }

    /// Card identifier as upper-case hex
    pub fn card_id_hex(&self) -> String {
        hex::encode_upper(&self.card_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_response() -> TlvList {
        let card_data = TlvList::new()
            .with(Tag::Batch, [0x00, 0x17])
            .with(Tag::ManufactureDateTime, [0x07, 0xE4, 0x03, 0x15])
            .with(Tag::BlockchainName, b"BTC")
            .with(Tag::TokenDecimal, [8])
            .encode()
            .unwrap();

        TlvList::new()
            .with(Tag::CardId, hex::decode("CB22000000029389").unwrap())
            .with(Tag::ManufacturerName, b"SMART CASH")
            .with(Tag::Status, [0x02])
            .with(Tag::Firmware, b"2.42r")
            .with(Tag::CardPublicKey, [0x04; 65])
            .with(Tag::SigningMethod, [0x85])
            .with(Tag::CardData, card_data)
            .with(Tag::CurveId, b"secp256k1\0")
            .with(Tag::MaxSignatures, [0x00, 0x01, 0x86, 0xA0])
            .with(Tag::PauseBeforePin2, [0x01, 0xF4])
            .with(Tag::WalletPublicKey, [0x04; 65])
            .with(Tag::WalletRemainingSignatures, [0x00, 0x01, 0x86, 0x9F])
            .with(Tag::WalletSignedHashes, [0x01])
            .with(Tag::Health, [0x00])
    }

    #[test]
    fn test_record_from_read_response() {
        let record = CardRecord::from_tlv(&read_response()).unwrap();
        assert_eq!(record.card_id_hex(), "CB22000000029389");
        assert_eq!(record.status, CardStatus::Loaded);
        assert_eq!(record.firmware.as_deref(), Some("2.42r"));
        assert_eq!(record.curve.as_deref(), Some("secp256k1"));
        assert_eq!(record.max_signatures, Some(100_000));
        assert_eq!(record.remaining_signatures, Some(99_999));
        assert_eq!(record.pause_before_pin2, Some(500));
        assert_eq!(record.card_verified, None);

        let card_data = record.card_data.unwrap();
        assert_eq!(card_data.batch.as_deref(), Some("0017"));
        assert_eq!(card_data.blockchain_name.as_deref(), Some("BTC"));
        assert_eq!(card_data.token_decimals, Some(8));
        assert_eq!(card_data.manufacture_date.unwrap().to_string(), "2020-03-21");
    }

    #[test]
    fn test_record_requires_card_id_and_status() {
        let tlv = TlvList::new().with(Tag::Status, [0x01]);
        assert_eq!(
            CardRecord::from_tlv(&tlv),
            Err(TlvError::MissingTag(Tag::CardId))
        );

        let tlv = TlvList::new()
            .with(Tag::CardId, [0x01; 8])
            .with(Tag::Status, [0x09]);
        assert!(matches!(
            CardRecord::from_tlv(&tlv),
            Err(TlvError::InvalidValue { tag: Tag::Status, .. })
        ));
    }

    #[test]
    fn test_signing_methods() {
        let single = SigningMethods::from_byte(0x02);
        assert!(single.contains(SigningMethod::SignHashValidatedByIssuer));
        assert!(!single.contains(SigningMethod::SignHash));

        // 0x85: mask of SignHash and SignHashValidatedByIssuer
        let mask = SigningMethods::from_byte(0x85);
        assert_eq!(
            mask.iter().collect::<Vec<_>>(),
            vec![
                SigningMethod::SignHash,
                SigningMethod::SignHashValidatedByIssuer
            ]
        );
        assert_eq!(
            SigningMethods::mask(&[
                SigningMethod::SignHash,
                SigningMethod::SignHashValidatedByIssuer
            ]),
            mask
        );
        assert_eq!(SigningMethods::single(SigningMethod::SignRaw).byte(), 0x01);
        assert_eq!(SigningMethod::from_code(7), None);
    }

    #[test]
    fn test_card_status_codes() {
        for status in [
            CardStatus::NotPersonalized,
            CardStatus::Empty,
            CardStatus::Loaded,
            CardStatus::Purged,
        ] {
            assert_eq!(CardStatus::from_code(status.code()), Some(status));
        }
    }
}
