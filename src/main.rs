mod config;
mod database;
mod entities;
mod error;
mod import;
mod notify;
mod router;
mod routes;
mod rsvp;
mod store;
mod token;
mod util;

use std::{fs, path::PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::Config,
    database::setup_database,
    import::Encoding,
    notify::{EmailKind, Notifier, render_email},
    router::{AppState, create_router, setup_templates, shutdown_signal},
};

#[derive(Parser)]
#[command(name = "bigday-rs", about = "Wedding guest list and RSVP site")]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the web server (default)
    Serve,
    /// Import guests from a semicolon-separated file
    Import {
        /// CSV file with first_name;last_name;party;is_child columns
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = Encoding::Latin1)]
        encoding: Encoding,
    },
    /// Export every guest as CSV
    Export {
        /// Write to this file instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = ';')]
        delimiter: char,
    },
    /// Email a household its invitation or save-the-date
    Send {
        /// Invitation token of the household
        token: String,
        #[arg(long, value_enum, default_value_t = EmailKind::Invitation)]
        kind: EmailKind,
        /// Recipient address, repeatable
        #[arg(long = "to", required = true)]
        recipients: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = setup_database(&config.database_url)
        .await
        .context("Cannot connect to db")?;

    match cli.cmd.unwrap_or(Cmd::Serve) {
        Cmd::Serve => serve(db, config).await,
        Cmd::Import { path, encoding } => {
            let report = import::import_file(&db, &path, encoding).await?;
            for skipped in &report.skipped {
                eprintln!("line {}: skipped ({})", skipped.line, skipped.reason);
            }
            println!(
                "Import done: {} created, {} updated, {} skipped, {} new households",
                report.created(),
                report.updated(),
                report.skipped.len(),
                report.households_created
            );
            Ok(())
        }
        Cmd::Export { out, delimiter } => {
            if !delimiter.is_ascii() {
                bail!("Delimiter must be a single ASCII character");
            }
            let csv = import::export_guests(&db, delimiter as u8).await?;
            match out {
                Some(path) => {
                    fs::write(&path, csv)
                        .with_context(|| format!("Cannot write {}", path.display()))?;
                    info!("Exported guests to {}", path.display());
                }
                None => print!("{csv}"),
            }
            Ok(())
        }
        Cmd::Send {
            token,
            kind,
            recipients,
        } => {
            let household = rsvp::resolve_household(&db, &token)
                .await
                .with_context(|| format!("No household with token {token}"))?;
            let guests = store::guests_of(&db, household.id).await?;
            let templates = setup_templates(&config);
            let email = render_email(&templates, &config, kind, &household, &guests)?;
            Notifier::from_config(&config.email)?
                .send(&email, &recipients)
                .await?;
            Ok(())
        }
    }
}

async fn serve(db: sea_orm::DatabaseConnection, config: Config) -> anyhow::Result<()> {
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(db, config)?);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Cannot listen on {bind_addr}"))?;
    info!("Listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
