// API module
//
// Thin REST transport over a shared ledger handle

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;
