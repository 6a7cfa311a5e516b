use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paperdesk::config::ServiceConfig;
use paperdesk::lifecycle::SessionManager;
use paperdesk::{api, db};

#[derive(Parser)]
#[command(name = "paperdesk")]
#[command(about = "Research paper search sessions backed by an external summarizer")]
struct Cli {
    /// SQLite database file (defaults to the platform data directory)
    #[arg(long, global = true, env = "PAPERDESK_DB_PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory that holds one output directory per session
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Mark sessions left in processing/analyzing by a previous run as failed
    Reconcile,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "paperdesk=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<db::Database> {
    let db = match path {
        Some(path) => db::Database::open(path)?,
        None => db::Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(db: db::Database, config: ServiceConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let sessions = SessionManager::new(db, config);
    sessions.reconcile_stale()?;

    let app = api::create_router(sessions.clone());

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("paperdesk listening on http://{}:{}", host, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await?;

    sessions.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve {
            port,
            host,
            output_dir,
        }) => {
            let mut config = ServiceConfig::from_env();
            if let Some(dir) = output_dir {
                config.output_root = dir;
            }
            serve(open_database(cli.db)?, config, &host, port).await?;
        }
        Some(Commands::Reconcile) => {
            let db = open_database(cli.db)?;
            let count = db.fail_stale_queries()?;
            println!("Marked {} stale session(s) as failed", count);
        }
        None => {
            serve(open_database(cli.db)?, ServiceConfig::from_env(), "127.0.0.1", 8000).await?;
        }
    }

    Ok(())
}
