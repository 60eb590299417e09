//! # Lost & Found Kiosk
//!
//! The entry point that assembles the store, the form controller and the live
//! feed based on configuration and compile-time features, then serves a
//! terminal front-end on stdin/stdout.

mod console;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use configs::{AppConfig, StoreBackend};
use lf_core::ReportStore;
use lf_services::{
    PhotoUpload, RawReportFields, ReportFeed, ReportSubmissionController, SubmissionOutcome,
    TimeoutStore,
};
use lf_store_memory::InMemoryReportStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use console::Command;

// Feature-gated imports
#[cfg(feature = "db-sqlite")]
use lf_db_sqlite::SqliteReportStore;

#[cfg(feature = "storage-local")]
use lf_storage_local::LocalMediaStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config);

    // 1. Initialize the report store
    let store = build_store(&config).await?;
    let store: Arc<dyn ReportStore> =
        Arc::new(TimeoutStore::new(store, config.store.submit_timeout()));

    // 2. Wire the form controller, with photo uploads when enabled
    let mut controller = ReportSubmissionController::new(store.clone());
    #[cfg(feature = "storage-local")]
    if config.media.enabled {
        let media = LocalMediaStore::new(
            config.media.root_path.clone(),
            config.media.url_prefix.clone(),
        );
        controller = controller.with_media(Arc::new(media), config.media.max_bytes);
    }

    // 3. Open the live feed and render every change
    let feed = ReportFeed::new(store);
    if let Err(err) = feed.start().await {
        tracing::error!(error = %err, "report feed unavailable");
    }
    let mut updates = feed.watch();
    let renderer = tokio::spawn(async move {
        loop {
            let text = lf_ui::render_feed(&updates.borrow_and_update());
            println!("\n{text}\n");
            if updates.changed().await.is_err() {
                break;
            }
        }
    });

    tracing::info!(
        backend = ?config.store.backend,
        collection = %config.store.collection,
        "lost & found kiosk ready"
    );
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match console::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}\n{}", console::HELP);
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => println!("{}", console::HELP),
            Command::List => println!("{}", lf_ui::render_feed(&feed.display_state())),
            Command::Retry => submit(&controller, controller.form()).await,
            Command::Report { mut fields, photo } => {
                if let Some(path) = photo {
                    match read_photo(&path).await {
                        Ok(upload) => fields.photo = Some(upload),
                        Err(err) => {
                            println!("could not read photo {}: {err:#}", path.display());
                            continue;
                        }
                    }
                }
                submit(&controller, fields).await;
            }
        }
    }

    feed.stop();
    renderer.abort();
    tracing::info!("lost & found kiosk stopped");
    Ok(())
}

async fn submit(controller: &ReportSubmissionController, fields: RawReportFields) {
    let outcome = controller.submit(fields).await;
    if let SubmissionOutcome::StoreFailed(err) = &outcome {
        tracing::warn!(error = %err, "submission failed");
    }
    println!("{}", lf_ui::describe_outcome(&outcome));
}

async fn read_photo(path: &Path) -> anyhow::Result<PhotoUpload> {
    let data = tokio::fs::read(path).await?;
    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(PhotoUpload {
        data: Bytes::from(data),
        content_type,
    })
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ReportStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryReportStore::new())),
        #[cfg(feature = "db-sqlite")]
        StoreBackend::Sqlite => {
            let store =
                SqliteReportStore::connect(&config.store.database_url, &config.store.collection)
                    .await
                    .context("opening sqlite report store")?
                    .with_poll_interval(config.store.poll_interval());
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "db-sqlite"))]
        StoreBackend::Sqlite => anyhow::bail!("built without the db-sqlite feature"),
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so they do not interleave with the kiosk output.
    if config.log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
