//! REST API server example
//!
//! Runs attachvault with the REST API enabled. Credentials come from the
//! environment or a `.env` file (`BOT_TOKEN`, `USER_TOKEN`,
//! `UPLOAD_CHANNEL_ID`); without them the server runs on an in-memory host,
//! which is handy for trying the API out.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6790/swagger-ui
//! - Upload via POST http://localhost:6790/files
//! - Stream a file back via GET http://localhost:6790/files/{name}
//! - Stream events via GET http://localhost:6790/events

use attachvault::api::start_api_server;
use attachvault::{AttachmentVault, Config, MemoryHost, run_with_shutdown};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let has_credentials = config.host.bot_token.is_some()
        && config.host.user_token.is_some()
        && config.host.channel_id.is_some();

    let vault = if has_credentials {
        AttachmentVault::new(config.clone()).await?
    } else {
        tracing::warn!("host credentials missing, storing chunks in memory");
        AttachmentVault::with_host(config.clone(), Arc::new(MemoryHost::new())).await?
    };

    let address = config.api.bind_address;
    println!("Starting attachvault REST API server on {address}");
    println!("Swagger UI: http://{address}/swagger-ui");
    println!();
    println!("Example commands:");
    println!("  # Upload a file");
    println!("  curl -F file=@backup.tar http://{address}/files");
    println!();
    println!("  # List files");
    println!("  curl http://{address}/files");
    println!();
    println!("  # Download a file");
    println!("  curl -o backup.tar http://{address}/files/backup.tar");
    println!();
    println!("  # Stream events (Server-Sent Events)");
    println!("  curl -N http://{address}/events");

    let server = tokio::spawn(start_api_server(
        Arc::new(vault.clone()),
        Arc::new(config),
    ));

    run_with_shutdown(vault).await?;
    server.await??;

    Ok(())
}
