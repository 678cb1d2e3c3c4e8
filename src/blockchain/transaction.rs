use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::amount::Amount;
use super::crypto::{self, Address, CryptoError, DigitalSignature, Wallet};
use super::pool::AuthError;

/// Sender identity used only by mining reward transactions
pub const SYSTEM_SENDER: &str = "THE BLOCKCHAIN";

/// Errors that can occur while building or decoding a transaction
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid sender address: {0}")]
    InvalidSenderAddress(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// A value transfer between two addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address
    #[schema(value_type = String)]
    pub sender_address: Address,

    /// Recipient's address
    #[schema(value_type = String)]
    pub recipient_address: Address,

    /// Amount being transferred
    #[schema(value_type = String, example = "3.0")]
    pub amount: Amount,
}

impl Transaction {
    /// Creates a new unsigned transaction
    pub fn new(sender_address: Address, recipient_address: Address, amount: Amount) -> Self {
        Transaction {
            sender_address,
            recipient_address,
            amount,
        }
    }

    /// Creates the mining reward transaction crediting `miner`
    pub(crate) fn new_reward(miner: Address, reward: Amount) -> Self {
        Transaction::new(Address(SYSTEM_SENDER.to_string()), miner, reward)
    }

    /// Checks if the transaction claims the system sender identity
    pub fn is_reward(&self) -> bool {
        self.sender_address.as_str() == SYSTEM_SENDER
    }

    /// Canonical bytes fed to signing and block hashing.
    ///
    /// Layout:
    /// `len(sender) u32 LE | sender | len(recipient) u32 LE | recipient | amount bits i128 LE`.
    /// Any change here invalidates every existing signature.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let sender = self.sender_address.as_str().as_bytes();
        let recipient = self.recipient_address.as_str().as_bytes();

        let mut out = Vec::with_capacity(4 + sender.len() + 4 + recipient.len() + 16);
        out.extend_from_slice(&(sender.len() as u32).to_le_bytes());
        out.extend_from_slice(sender);
        out.extend_from_slice(&(recipient.len() as u32).to_le_bytes());
        out.extend_from_slice(recipient);
        out.extend_from_slice(&self.amount.to_bits().to_le_bytes());
        out
    }

    /// Signs the transaction with the sender's wallet
    pub fn sign(&self, wallet: &Wallet) -> Result<DigitalSignature, TransactionError> {
        if wallet.address() != &self.sender_address {
            return Err(TransactionError::InvalidSenderAddress(
                "Wallet address does not match sender address".to_string(),
            ));
        }

        Ok(wallet.sign(&self.canonical_bytes()))
    }

    /// Verifies a detached signature over this transaction
    pub fn verify(&self, signature: &DigitalSignature, public_key: &PublicKey) -> bool {
        crypto::verify(public_key, signature, &self.canonical_bytes())
    }
}

/// A decoded, not yet authorized submission
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: DigitalSignature,
    pub public_key: PublicKey,
}

/// Transaction submission as received from a client
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The sender's address
    pub sender_address: Option<String>,

    /// The recipient's address
    pub recipient_address: Option<String>,

    /// The sender's public key, `X || Y` as 128 hex characters
    pub sender_public_key: Option<String>,

    /// The amount to transfer
    #[schema(value_type = String, example = "3.0")]
    pub amount: Option<Amount>,

    /// The signature, `r || s` as 128 hex characters
    pub signature: Option<String>,
}

impl TransactionRequest {
    /// Decodes the request, rejecting missing fields, malformed hex, bad
    /// addresses, negative amounts and the reserved system sender.
    pub fn decode(self) -> Result<SignedTransaction, TransactionError> {
        let sender = self
            .sender_address
            .ok_or(TransactionError::MissingField("sender_address"))?;
        let recipient = self
            .recipient_address
            .ok_or(TransactionError::MissingField("recipient_address"))?;
        let public_key = self
            .sender_public_key
            .ok_or(TransactionError::MissingField("sender_public_key"))?;
        let amount = self.amount.ok_or(TransactionError::MissingField("amount"))?;
        let signature = self
            .signature
            .ok_or(TransactionError::MissingField("signature"))?;

        if sender == SYSTEM_SENDER {
            return Err(AuthError::ReservedSender.into());
        }

        if amount.is_negative() {
            return Err(TransactionError::InvalidAmount(format!(
                "Amount must not be negative: {}",
                amount
            )));
        }

        let sender_address: Address = sender.parse()?;
        let recipient_address: Address = recipient.parse()?;
        let public_key = crypto::parse_public_key(&public_key)?;
        let signature: DigitalSignature = signature.parse()?;

        Ok(SignedTransaction {
            transaction: Transaction::new(sender_address, recipient_address, amount),
            signature,
            public_key,
        })
    }
}
