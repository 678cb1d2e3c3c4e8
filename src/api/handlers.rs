use actix_web::{web, HttpResponse, Responder};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::blockchain::{
    Address, Amount, AuthError, Block, Ledger, MiningError, Transaction, TransactionError,
    TransactionRequest, Wallet,
};

use super::schema::{ErrorResponse, MessageResponse};

/// Shared ledger handle
pub type LedgerData = web::Data<Ledger>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain, genesis first
    pub chain: Vec<Block>,

    /// Whether every link and proof of work checks out
    pub is_valid: bool,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Query for the amount endpoint
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AmountQuery {
    /// The address to look up
    pub address: String,
}

/// Response for the amount endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AmountResponse {
    pub address: String,

    /// Committed balance, as a decimal string
    #[schema(value_type = String, example = "3")]
    pub amount: Amount,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's public key, `X || Y` hex
    pub public_key: String,

    /// The wallet's private key (hex encoded)
    pub private_key: String,
}

/// Request for the wallet transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletTransactionRequest {
    /// The sender's private key (for signing)
    pub sender_private_key: String,

    /// The recipient's address
    pub recipient_address: String,

    /// The amount to transfer
    #[schema(value_type = String, example = "3.0")]
    pub amount: Amount,
}

fn transaction_error_response(err: &TransactionError) -> HttpResponse {
    match err {
        TransactionError::Auth(AuthError::NegativeAmount(_)) => {
            HttpResponse::BadRequest().json(ErrorResponse::new(err))
        }
        TransactionError::Auth(_) => HttpResponse::Unauthorized().json(ErrorResponse::new(err)),
        _ => HttpResponse::BadRequest().json(ErrorResponse::new(err)),
    }
}

/// Get the full chain
///
/// Returns every block and the chain's validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(ledger: LedgerData) -> impl Responder {
    let chain = ledger.chain_snapshot();
    let is_valid = ledger.verify_chain_integrity();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    })
}

/// Get all pending transactions
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    responses(
        (
            status = 200,
            description = "Pending transactions retrieved successfully",
            body = Vec<Transaction>
        )
    )
)]
pub async fn get_pending_transactions(ledger: LedgerData) -> impl Responder {
    let transactions: Vec<Transaction> = ledger.pending_transactions();
    HttpResponse::Ok().json(transactions)
}

/// Submit a signed transaction
///
/// Verifies the signature and adds the transaction to the pool
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction accepted", body = MessageResponse),
        (status = 400, description = "Malformed transaction", body = ErrorResponse),
        (status = 401, description = "Signature rejected", body = ErrorResponse)
    )
)]
pub async fn new_transaction(
    ledger: LedgerData,
    request: web::Json<TransactionRequest>,
) -> impl Responder {
    let signed = match request.into_inner().decode() {
        Ok(signed) => signed,
        Err(err) => {
            warn!("Rejected transaction request: {}", err);
            return transaction_error_response(&err);
        }
    };

    match ledger.submit(signed) {
        Ok(()) => {
            HttpResponse::Created().json(MessageResponse::new("Transaction added to the pool"))
        }
        Err(err) => transaction_error_response(&TransactionError::Auth(err)),
    }
}

/// Mine a new block
///
/// Commits all pending transactions plus the mining reward
#[utoipa::path(
    post,
    path = "/api/v1/mine",
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 409, description = "Nothing to mine", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mine_block(ledger: LedgerData) -> impl Responder {
    let ledger = ledger.into_inner();
    let result = web::block(move || ledger.mine()).await;

    match result {
        Ok(Ok(block)) => HttpResponse::Ok().json(MineResponse {
            message: "New Block Mined".to_string(),
            block,
        }),
        Ok(Err(MiningError::EmptyPool)) => {
            HttpResponse::Conflict().json(ErrorResponse::new(MiningError::EmptyPool))
        }
        Ok(Err(err)) => {
            error!("Mining failed: {}", err);
            HttpResponse::InternalServerError().json(ErrorResponse::new(err))
        }
        Err(err) => {
            error!("Mining worker failed: {}", err);
            HttpResponse::InternalServerError().json(ErrorResponse::new(err))
        }
    }
}

/// Get the balance of an address
///
/// Sums every committed transfer to and from the address
#[utoipa::path(
    get,
    path = "/api/v1/amount",
    params(AmountQuery),
    responses(
        (status = 200, description = "Balance retrieved successfully", body = AmountResponse),
        (status = 400, description = "Invalid address", body = ErrorResponse),
        (status = 500, description = "Balance out of range", body = ErrorResponse)
    )
)]
pub async fn get_amount(ledger: LedgerData, query: web::Query<AmountQuery>) -> impl Responder {
    let address: Address = match query.address.parse() {
        Ok(address) => address,
        Err(err) => return HttpResponse::BadRequest().json(ErrorResponse::new(err)),
    };

    match ledger.balance_of(&address) {
        Ok(amount) => HttpResponse::Ok().json(AmountResponse {
            address: address.0,
            amount,
        }),
        Err(err) => {
            error!("Balance of {} cannot be computed: {}", address, err);
            HttpResponse::InternalServerError().json(ErrorResponse::new(err))
        }
    }
}

/// Check if the chain is valid
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.verify_chain_integrity())
}

/// Create a new wallet
///
/// Creates a new wallet with a random key pair.
///
/// The private key is not stored by the server
#[utoipa::path(
    post,
    path = "/api/v1/wallet",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet() -> impl Responder {
    let wallet = Wallet::new();

    HttpResponse::Created().json(WalletResponse {
        address: wallet.address().0.clone(),
        public_key: wallet.public_key_hex(),
        private_key: wallet.private_key_hex(),
    })
}

/// Sign and submit a transfer from a wallet
///
/// Signs the transfer with the given private key and adds it to the pool
#[utoipa::path(
    post,
    path = "/api/v1/wallet/transaction",
    request_body = WalletTransactionRequest,
    responses(
        (status = 201, description = "Transaction accepted", body = MessageResponse),
        (status = 400, description = "Invalid transaction data", body = ErrorResponse),
        (status = 401, description = "Signature rejected", body = ErrorResponse)
    )
)]
pub async fn wallet_transaction(
    ledger: LedgerData,
    request: web::Json<WalletTransactionRequest>,
) -> impl Responder {
    let wallet = match Wallet::from_private_key_hex(&request.sender_private_key) {
        Ok(wallet) => wallet,
        Err(_) => {
            // Never echo key material back
            return HttpResponse::BadRequest().json(ErrorResponse::new("Invalid private key"));
        }
    };

    let recipient: Address = match request.recipient_address.parse() {
        Ok(address) => address,
        Err(err) => return HttpResponse::BadRequest().json(ErrorResponse::new(err)),
    };

    let transaction = Transaction::new(wallet.address().clone(), recipient, request.amount);
    let signature = match transaction.sign(&wallet) {
        Ok(signature) => signature,
        Err(err) => return transaction_error_response(&err),
    };

    match ledger.submit_transaction(
        transaction.sender_address,
        transaction.recipient_address,
        transaction.amount,
        &signature,
        wallet.public_key(),
    ) {
        Ok(()) => {
            HttpResponse::Created().json(MessageResponse::new("Transaction added to the pool"))
        }
        Err(err) => transaction_error_response(&TransactionError::Auth(err)),
    }
}
