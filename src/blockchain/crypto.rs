use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

/// Shared secp256k1 context; building one is expensive.
static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Version byte prepended to the 160-bit key hash
pub const ADDRESS_VERSION: u8 = 0x00;

/// Length of the checksum appended to a versioned key hash
pub const ADDRESS_CHECKSUM_LEN: usize = 4;

/// Version byte + RIPEMD-160 digest + checksum
const ADDRESS_PAYLOAD_LEN: usize = 1 + 20 + ADDRESS_CHECKSUM_LEN;

/// Hex width of one coordinate or scalar (32 bytes)
const SCALAR_HEX_LEN: usize = 64;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// A private scalar and its public curve point
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Builds a key pair from an existing private scalar
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

/// Generates a fresh secp256k1 key pair from the OS random source.
///
/// # Panics
///
/// Panics if the operating system cannot provide randomness; no key can be
/// trusted in that state.
pub fn generate_keypair() -> KeyPair {
    let secret_key = SecretKey::new(&mut OsRng);
    KeyPair::from_secret_key(secret_key)
}

/// The uncompressed `X || Y` coordinates of a public point
fn point_coordinates(public_key: &PublicKey) -> [u8; 64] {
    let uncompressed = public_key.serialize_uncompressed();
    let mut coords = [0u8; 64];
    coords.copy_from_slice(&uncompressed[1..]);
    coords
}

fn address_checksum(versioned: &[u8]) -> [u8; ADDRESS_CHECKSUM_LEN] {
    let first = Sha256::digest(versioned);
    let second = Sha256::digest(first);
    let mut checksum = [0u8; ADDRESS_CHECKSUM_LEN];
    checksum.copy_from_slice(&second[..ADDRESS_CHECKSUM_LEN]);
    checksum
}

/// Represents an account address (base58 of version + key hash + checksum)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Derives the checksummed address of a public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let key_hash = Ripemd160::digest(Sha256::digest(point_coordinates(public_key)));

        let mut payload = Vec::with_capacity(ADDRESS_PAYLOAD_LEN);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&key_hash);
        let checksum = address_checksum(&payload);
        payload.extend_from_slice(&checksum);

        Address(bs58::encode(payload).into_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Derives the address of a public key; same key, same address.
pub fn derive_address(public_key: &PublicKey) -> Address {
    Address::from_public_key(public_key)
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    /// Parses an address, checking its length, version and checksum
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        if bytes.len() != ADDRESS_PAYLOAD_LEN {
            return Err(CryptoError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_PAYLOAD_LEN,
                bytes.len()
            )));
        }

        if bytes[0] != ADDRESS_VERSION {
            return Err(CryptoError::InvalidAddress(format!(
                "unknown version byte {:#04x}",
                bytes[0]
            )));
        }

        let (versioned, checksum) = bytes.split_at(ADDRESS_PAYLOAD_LEN - ADDRESS_CHECKSUM_LEN);
        if address_checksum(versioned).as_slice() != checksum {
            return Err(CryptoError::InvalidAddress("checksum mismatch".to_string()));
        }

        Ok(Address(s.to_string()))
    }
}

fn decode_fixed_hex<const N: usize>(s: &str, what: &str) -> Result<[u8; N], CryptoError> {
    if s.len() != N * 2 {
        return Err(CryptoError::DecodingError(format!(
            "{} must be {} hex characters, got {}",
            what,
            N * 2,
            s.len()
        )));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(s, &mut out)
        .map_err(|e| CryptoError::DecodingError(format!("{}: {}", what, e)))?;
    Ok(out)
}

/// Renders a public key as 128 hex characters (`X || Y`)
pub fn serialize_public_key(public_key: &PublicKey) -> String {
    hex::encode(point_coordinates(public_key))
}

/// Parses the `X || Y` hex form produced by [`serialize_public_key`]
pub fn parse_public_key(s: &str) -> Result<PublicKey, CryptoError> {
    let coords: [u8; 64] = decode_fixed_hex(s, "public key")?;
    let mut uncompressed = [0u8; 65];
    uncompressed[0] = 0x04;
    uncompressed[1..].copy_from_slice(&coords);
    PublicKey::from_slice(&uncompressed).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Renders a private scalar as 64 hex characters
pub fn serialize_private_key(secret_key: &SecretKey) -> String {
    hex::encode(secret_key.secret_bytes())
}

/// Parses a 64-character hex private scalar; zero and out-of-range scalars are rejected
pub fn parse_private_key(s: &str) -> Result<SecretKey, CryptoError> {
    let bytes: [u8; 32] = decode_fixed_hex(s, "private key")?;
    SecretKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

/// A detached ECDSA signature, kept as its fixed-width `r` and `s` components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl DigitalSignature {
    fn from_signature(signature: &Signature) -> Self {
        let compact = signature.serialize_compact();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        DigitalSignature { r, s }
    }

    fn to_signature(self) -> Result<Signature, CryptoError> {
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r);
        compact[32..].copy_from_slice(&self.s);
        Signature::from_compact(&compact).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }

    /// `r || s` as 128 hex characters
    pub fn to_hex(&self) -> String {
        format!("{}{}", hex::encode(self.r), hex::encode(self.s))
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for DigitalSignature {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() || s.len() != SCALAR_HEX_LEN * 2 {
            return Err(CryptoError::DecodingError(format!(
                "signature must be {} hex characters, got {}",
                SCALAR_HEX_LEN * 2,
                s.len()
            )));
        }
        let r = decode_fixed_hex(&s[..SCALAR_HEX_LEN], "signature r")?;
        let s = decode_fixed_hex(&s[SCALAR_HEX_LEN..], "signature s")?;
        Ok(DigitalSignature { r, s })
    }
}

fn message_digest(canonical_bytes: &[u8]) -> Message {
    Message::from_digest(Sha256::digest(canonical_bytes).into())
}

/// Signs the SHA-256 digest of `canonical_bytes`.
///
/// Nonces follow RFC 6979, so the same key and payload always produce the
/// same signature.
pub fn sign(secret_key: &SecretKey, canonical_bytes: &[u8]) -> DigitalSignature {
    let signature = SECP.sign_ecdsa(&message_digest(canonical_bytes), secret_key);
    DigitalSignature::from_signature(&signature)
}

/// Checks a signature against `canonical_bytes`. Malformed components yield `false`.
pub fn verify(
    public_key: &PublicKey,
    signature: &DigitalSignature,
    canonical_bytes: &[u8],
) -> bool {
    let signature = match signature.to_signature() {
        Ok(signature) => signature,
        Err(_) => return false,
    };

    SECP.verify_ecdsa(&message_digest(canonical_bytes), &signature, public_key)
        .is_ok()
}

/// A key pair together with its derived address
#[derive(Debug, Clone)]
pub struct Wallet {
    keypair: KeyPair,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random key pair
    pub fn new() -> Self {
        Self::from_keypair(generate_keypair())
    }

    pub fn from_keypair(keypair: KeyPair) -> Self {
        let address = derive_address(keypair.public_key());
        Wallet { keypair, address }
    }

    /// Restores a wallet from its hex-encoded private key
    pub fn from_private_key_hex(private_key: &str) -> Result<Self, CryptoError> {
        let secret_key = parse_private_key(private_key)?;
        Ok(Self::from_keypair(KeyPair::from_secret_key(secret_key)))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    pub fn public_key_hex(&self) -> String {
        serialize_public_key(self.keypair.public_key())
    }

    pub fn private_key_hex(&self) -> String {
        serialize_private_key(self.keypair.secret_key())
    }

    /// Signs a message with the wallet's private key
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        sign(self.keypair.secret_key(), message)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
