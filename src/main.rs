use anyhow::{Context, Result};
use axum::Router;
use bucket_warden::{
    app::AppState,
    config::{AppConfig, Command, GroupAction},
    db,
    routes,
    services::{group_directory::SqliteGroupDirectory, metadata_store::SqliteMetadataStore},
};
use std::{fs, io::ErrorKind, path::Path};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-warden with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection + schema ---
    let db = db::connect(&cfg.database_url).await?;
    db::run_migrations(&db).await?;
    SqliteMetadataStore::new(db.clone())
        .normalize_legacy_flags()
        .await
        .context("normalizing legacy should_heal values")?;

    match command {
        Command::Migrate => {
            tracing::info!("Database migration complete.");
            Ok(())
        }
        Command::Reconcile => {
            let state = AppState::build(&cfg, db);
            let report = state.reconciler.reconcile().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Audit {
            resource_name,
            project,
        } => {
            let state = AppState::build(&cfg, db);
            let records = state
                .buckets
                .audit(resource_name.as_deref(), project.as_deref())
                .await
                .context("reading audit history")?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::Group { action } => manage_group(SqliteGroupDirectory::new(db), action).await,
        Command::Serve => serve(&cfg, AppState::build(&cfg, db)).await,
    }
}

async fn manage_group(directory: SqliteGroupDirectory, action: GroupAction) -> Result<()> {
    match action {
        GroupAction::Add { identity, group } => {
            let added = directory.add_member(&identity, &group).await?;
            tracing::info!(%identity, %group, added, "group membership added");
        }
        GroupAction::Remove { identity, group } => {
            let removed = directory.remove_member(&identity, &group).await?;
            tracing::info!(%identity, %group, removed, "group membership removed");
        }
        GroupAction::List { group } => {
            for identity in directory.members(&group).await? {
                println!("{identity}");
            }
        }
    }
    Ok(())
}

async fn serve(cfg: &AppConfig, state: AppState) -> Result<()> {
    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
