//! pamphlet-tiles - content-addressed tiles for very large page images.
//!
//! This binary runs the gateway and the publishing tools.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pamphlet_tiles::{
    config::{
        Cli, Command, DeleteConfig, PublishConfig, ServeConfig, SignConfig, SignOutputFormat,
        StoreArgs,
    },
    create_s3_client,
    gateway::Gateway,
    pamphlet::{PageSource, PublishOptions, Publisher},
    server::{auth::AccessTokenService, create_router, RouterConfig},
    store::{ObjectStore, S3ObjectStore, PAMPHLETS_PREFIX},
    PublishError,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Publish(config) => run_publish(config).await,
        Command::Delete(config) => run_delete(config).await,
        Command::Sign(config) => run_sign(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("pamphlet-tiles v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    log_store_args(&config.store);

    if config.auth_enabled {
        info!(
            "  Auth: access tokens (max age {}s, bucket {}s)",
            config.token_max_age, config.token_bucket_width
        );
    } else {
        warn!("  Auth: DISABLED - pamphlets are readable by anyone who knows the id");
        warn!("        Enable for production: --auth-enabled --auth-secret=<secret>");
    }
    if config.admin_secret.is_some() {
        info!("  Admin routes: enabled");
    }
    info!(
        "  Edge cache: {}MB, descriptor TTL {}s, tile format {}",
        config.cache_size_mb, config.descriptor_ttl, config.tile_format
    );

    let store = open_store(&config.store).await;

    info!("");
    info!("Connecting to S3...");
    match store.list(PAMPHLETS_PREFIX, None, 1).await {
        Ok(_) => info!("  Connected successfully"),
        Err(e) => {
            error!("  Failed to connect to S3: {}", e);
            error!("");
            error!("  Please check:");
            error!("    - Your AWS credentials are configured correctly");
            error!(
                "    - The bucket '{}' exists and is accessible",
                config.store.s3_bucket
            );
            error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
            return ExitCode::FAILURE;
        }
    }

    let gateway = Arc::new(Gateway::new(Arc::new(store), config.gateway_config()));
    let router = create_router(gateway.clone(), build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/pamphlets/<pamphlet_id>/metadata.json", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Let in-flight cache fills finish before exiting
    gateway.flush().await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, draining connections");
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if config.auth_enabled {
        let tokens = AccessTokenService::new(config.auth_secret_or_empty())
            .with_bucket_width(config.token_bucket_width);
        router_config = router_config.with_token_auth(tokens, config.token_max_age());
    }

    if let Some(ref secret) = config.admin_secret {
        router_config = router_config.with_admin_secret(secret.clone());
    }

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Publish Command
// =============================================================================

async fn run_publish(config: PublishConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let options = match config.publish_options() {
        Ok(options) => options,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut sources = Vec::with_capacity(config.images.len());
    for path in &config.images {
        match read_page(path).await {
            Ok(source) => sources.push(source),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
    }

    log_store_args(&config.store);
    let store = open_store(&config.store).await;
    let publisher = Publisher::new(Arc::new(store), options);

    match publisher.publish(&config.pamphlet_id, sources).await {
        Ok(report) => {
            for failure in &report.failures {
                warn!("Skipped {}", failure);
            }
            println!(
                "Published {} v{}: {} page(s), {} tile(s), {} object(s) written",
                config.pamphlet_id, report.version, report.pages, report.tiles, report.uploaded
            );
            ExitCode::SUCCESS
        }
        Err(PublishError::Incomplete { failures }) => {
            error!(
                "Publish incomplete, descriptor not written ({} failure(s)):",
                failures.len()
            );
            for failure in &failures {
                error!("  {}", failure);
            }
            error!("Re-run with --allow-partial to publish the pages that succeeded");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Publish failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn read_page(path: &Path) -> std::io::Result<PageSource> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(PageSource::new(name, bytes))
}

// =============================================================================
// Delete Command
// =============================================================================

async fn run_delete(config: DeleteConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    log_store_args(&config.store);
    let store = open_store(&config.store).await;
    let publisher = Publisher::new(Arc::new(store), PublishOptions::default());

    match publisher.unpublish(&config.pamphlet_id).await {
        Ok(deleted) => {
            println!("Deleted {} object(s) for {}", deleted, config.pamphlet_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Delete failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let tokens = AccessTokenService::new(&config.secret).with_bucket_width(config.bucket_width);
    let issued = tokens.issue(&config.pamphlet_id, Duration::from_secs(config.ttl));

    match config.format {
        SignOutputFormat::Token => {
            println!("{}", issued.token);
        }
        SignOutputFormat::Header => {
            println!("Authorization: Bearer {}", issued.token);
        }
        SignOutputFormat::Json => match serde_json::to_string_pretty(&issued) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pamphlet_tiles=debug,tower_http=debug"
    } else {
        "pamphlet_tiles=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_store_args(store: &StoreArgs) {
    info!("  S3 bucket: {}", store.s3_bucket);
    if let Some(ref endpoint) = store.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", store.s3_region);
    if let Some(ref root) = store.s3_root {
        info!("  S3 root: {}", root);
    }
}

async fn open_store(args: &StoreArgs) -> S3ObjectStore {
    let client = create_s3_client(args.s3_endpoint.as_deref(), &args.s3_region).await;
    let store = S3ObjectStore::new(client, args.s3_bucket.clone());
    match &args.s3_root {
        Some(root) => store.with_root(root.as_str()),
        None => store,
    }
}
