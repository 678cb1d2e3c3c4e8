use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/transactions", web::get().to(handlers::get_pending_transactions))
            .route("/transactions", web::post().to(handlers::new_transaction))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/amount", web::get().to(handlers::get_amount))
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/wallet", web::post().to(handlers::create_wallet))
            .route("/wallet/transaction", web::post().to(handlers::wallet_transaction))
    );
}
