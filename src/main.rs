use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;

use coinvest::repositories::{memory::MemoryStore, postgres::PgStore, Store};
use coinvest::server::{self, AppState};
use coinvest::services::{self, mail::Mailer, ServiceManager};
use coinvest::settings::Settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::new(&args.config).expect("Failed to load settings.");

    init_logging(&args.log4rs).expect("Failed to initialize logging.");
    log::info!("Starting coinvest.");

    let store = connect(&settings).await.expect("Could not connect to database.");

    let (mail_tx, mail_rx) = mpsc::channel(256);
    let services = ServiceManager::new(store.clone(), &settings, Mailer::new(mail_tx));

    println!("[*] Starting services.");
    services::start_services(store, &settings, mail_rx)
        .await
        .expect("Could not start services.");

    server::start_http_server(AppState::new(services), &args.listen).await?;

    Ok(())
}

async fn connect(settings: &Settings) -> Result<Arc<dyn Store>, anyhow::Error> {
    if settings.database.url.starts_with("memory://") {
        log::warn!("Using the in-memory store; nothing will be persisted.");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let conn = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    let store = PgStore::new(conn);
    store.migrate().await?;
    Ok(Arc::new(store))
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
