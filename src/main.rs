use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use clap::Parser;
use log::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::path::PathBuf;
use std::time::Duration;

use powledger::api;
use powledger::blockchain::{self, Address, Ledger, Wallet};
use powledger::config::Config;
use powledger::miner::Miner;

/// Command line options; each one overrides the config file
#[derive(Debug, Parser)]
#[command(name = "powledger", about = "Proof-of-work ledger server")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port for the HTTP server
    #[arg(short, long)]
    port: Option<u16>,

    /// Leading zero hex characters required of a block hash
    #[arg(short, long)]
    difficulty: Option<usize>,
}

// Resolve the address credited with mining rewards
fn owner_address(config: &Config) -> Address {
    if let Some(configured) = config.owner_address() {
        match configured.parse::<Address>() {
            Ok(address) => return address,
            Err(err) => warn!("Ignoring configured owner address {}: {}", configured, err),
        }
    }

    let wallet = Wallet::new();
    info!("Generated miner wallet");
    info!("public_key: {}", wallet.public_key_hex());
    info!("blockchain_address: {}", wallet.address());
    wallet.address().clone()
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_pending_transactions,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::get_amount,
        api::handlers::validate_chain,
        api::handlers::create_wallet,
        api::handlers::wallet_transaction
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::TransactionRequest,
            blockchain::Address,
            api::schema::ErrorResponse,
            api::schema::MessageResponse,
            api::handlers::ChainResponse,
            api::handlers::MineResponse,
            api::handlers::AmountResponse,
            api::handlers::WalletResponse,
            api::handlers::WalletTransactionRequest
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "Ledger API",
        version = "0.1.0",
        description = "A single-node proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    let mut config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()));
        }
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(difficulty) = cli.difficulty {
        config.mining.difficulty = difficulty;
    }

    // One ledger per process, shared by the server and the miner
    let ledger = Ledger::with_difficulty(owner_address(&config), config.mining.difficulty);

    let miner = Miner::new(ledger.clone(), Duration::from_secs(config.mining.interval_secs));
    if config.mining.enabled {
        actix_web::rt::spawn(miner.clone().run());
    }

    let ledger = web::Data::new(ledger);
    let bind = (config.server.host.clone(), config.server.port);

    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    // Start HTTP server
    let result = HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        // Configure OpenAPI documentation
        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(ledger.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind(bind)?
    .run()
    .await;

    miner.stop();
    result
}
