//! Prize Draw - spend-verified weighted prize draws
//!
//! `serve` runs the HTTP API; `draw` runs one attempt in the terminal with the roll
//! animation; `seed-store` writes a store configuration.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prize_draw_backend::{
    api::{create_router, AppState},
    config::{ServerConfig, SettlementConfig},
    draw::{animator::MAX_CANDIDATES, DrawAttempt, DrawService, RollAnimator, RollState},
    models::{PrizeEntry, PrizeInventory, StoreState},
    settlement::SettlementClient,
    store::{SqliteLotteryStore, StoreConfigStore},
};

#[derive(Parser, Debug)]
#[command(name = "prize-draw")]
#[command(about = "Spend-verified weighted prize draws")]
struct Cli {
    /// SQLite database holding stores and draw history
    #[arg(long, env = "LOTTERY_DB_PATH", global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Run one draw attempt in the terminal
    Draw {
        /// Order identifier printed on the receipt
        #[arg(long)]
        code: String,
        #[arg(long)]
        store_id: i64,
    },
    /// Create or overwrite a store configuration
    SeedStore {
        #[arg(long)]
        store_id: i64,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        title: String,
        /// Spend required per draw
        #[arg(long)]
        min_spend: f64,
        /// Prize tier as NAME=QUANTITY, repeatable, in weight order
        #[arg(long = "prize", value_parser = parse_prize)]
        prizes: Vec<PrizeEntry>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let mut server = ServerConfig::from_env();
    if let Some(db) = cli.db {
        server.database_path = db;
    }

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                server.port = port;
            }
            serve(server).await
        }
        Command::Draw { code, store_id } => draw_in_terminal(&server, &code, store_id).await,
        Command::SeedStore {
            store_id,
            name,
            title,
            min_spend,
            prizes,
        } => {
            let store = SqliteLotteryStore::new(&server.database_path)?;
            let state = StoreState {
                id: store_id,
                name,
                dashboard_title: title,
                min_spend,
                inventory: PrizeInventory::new(prizes),
            };
            store.update_store(&state).await?;
            println!(
                "store {} saved with {} prizes in pool",
                state.id,
                state.inventory.total()
            );
            Ok(())
        }
    }
}

fn build_service(server: &ServerConfig) -> Result<(Arc<SettlementClient>, Arc<SqliteLotteryStore>, DrawService)> {
    // Missing credentials are fatal at startup, never retried.
    let settlement_config =
        SettlementConfig::from_env().context("Settlement configuration is incomplete")?;
    let settlement = Arc::new(SettlementClient::new(settlement_config)?);
    let store = Arc::new(SqliteLotteryStore::new(&server.database_path)?);
    let draws = DrawService::new(settlement.clone(), store.clone(), store.clone());
    Ok((settlement, store, draws))
}

async fn serve(server: ServerConfig) -> Result<()> {
    info!("🎰 Prize draw service starting");

    let (settlement, store, draws) = build_service(&server)?;
    let state = AppState {
        settlement,
        draws: Arc::new(draws),
        stores: store.clone(),
        history: store,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("🎯 API server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn draw_in_terminal(server: &ServerConfig, code: &str, store_id: i64) -> Result<()> {
    let (_, _, draws) = build_service(server)?;
    let candidates = draws.candidate_names(store_id, MAX_CANDIDATES).await?;

    let result_slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let poll_slot = result_slot.clone();

    let roll = RollAnimator::new().spawn(
        candidates,
        move || poll_slot.lock().clone(),
        |name| {
            print!("\r  {:<32}", name);
            let _ = std::io::stdout().flush();
        },
        |prize| println!("\r🎁 {:<32}", prize),
    );

    let message = match draws.attempt(code, store_id).await {
        Ok(DrawAttempt::Won(receipt)) => {
            *result_slot.lock() = Some(receipt.prize_name.clone());
            format!(
                "draw {}/{} for {} (net spend {:.2})",
                receipt.draws_used, receipt.draws_allowed, code, receipt.net_spend
            )
        }
        Ok(DrawAttempt::NoPurchaseHistory) => {
            "invalid receipt number, please check and try again".to_string()
        }
        Ok(DrawAttempt::AlreadyExhausted { allowed, used, .. }) => {
            format!("all draws used for this number ({used}/{allowed})")
        }
        Ok(DrawAttempt::PoolExhausted) => "sorry, the prize pool is empty".to_string(),
        Err(e) => {
            roll.stop();
            roll.finished().await;
            return Err(anyhow!(e)).context("please retry or contact support");
        }
    };

    if result_slot.lock().is_none() {
        roll.stop();
    }
    if let RollState::Cancelled = roll.finished().await {
        println!();
    }
    println!("{}", message);
    Ok(())
}

fn parse_prize(raw: &str) -> Result<PrizeEntry, String> {
    let (name, qty) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=QUANTITY, got {raw:?}"))?;
    let quantity = qty
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("bad quantity in {raw:?}: {e}"))?;
    if name.trim().is_empty() {
        return Err(format!("empty prize name in {raw:?}"));
    }
    Ok(PrizeEntry::new(name.trim(), quantity))
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv::dotenv();

    // 2) Also try the crate root, for runs with --manifest-path from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prize_draw_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
