//! Trading journal CLI - talks to the journal backend through the gateway
//! client.
//!
//! This binary is the composition root: it builds the credential store, the
//! session event hub, the invalidation listener and the client, then runs one
//! command.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use journal_gateway::auth::{
    clear_credentials, credential_source, spawn_invalidation_listener, ACCESS_TOKEN_KEY,
};
use journal_gateway::config::CredentialBackend;
use journal_gateway::{
    ApiClient, ApiError, ApiResponse, CredentialStore, FileStore, GatewayConfig, KeyringStore,
    SessionEvents, Settings,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: journal <command> [args]

Commands:
  login [token]        Store an API token (prompts when omitted)
  logout               Remove the stored token
  status               Show endpoint and credential state
  health               Check the backend health endpoint
  get <path>           GET a path under the API root
  post <path> <json>   POST a JSON body to a path under the API root";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn open_store(settings: &Settings) -> Result<Arc<dyn CredentialStore>> {
    match settings.credential_backend.unwrap_or_default() {
        CredentialBackend::Keyring => Ok(Arc::new(KeyringStore::new())),
        CredentialBackend::File => {
            let data_dir = Settings::data_dir()?;
            Ok(Arc::new(FileStore::in_dir(&data_dir)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let settings = Settings::load()?;
    let config = GatewayConfig::from_settings(&settings)?;
    let store = open_store(&settings)?;
    debug!(environment = %config.environment(), origin = config.origin(), "Configuration loaded");

    let events = SessionEvents::new();
    let listener = spawn_invalidation_listener(&events, store.clone());
    let client = ApiClient::new(config, store.clone(), events.clone())?;

    let result = run(command, &args[1..], &client, store.as_ref()).await;

    // Dropping the last senders lets the listener finish clearing state
    drop(client);
    drop(events);
    if let Err(e) = listener.await {
        warn!(error = %e, "Session listener failed, stored credential may not be cleared");
    }

    if let Err(ref e) = result {
        if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_unauthorized) {
            eprintln!("Session expired. Run `journal login` to sign in again.");
        }
    }
    result
}

async fn run(
    command: &str,
    args: &[String],
    client: &ApiClient,
    store: &dyn CredentialStore,
) -> Result<()> {
    match command {
        "login" => login(args.first().map(String::as_str), store),
        "logout" => {
            clear_credentials(store).context("Failed to remove stored token")?;
            println!("Logged out.");
            Ok(())
        }
        "status" => status(client, store),
        "health" => {
            let response = client.health().await?;
            print_response(&response)
        }
        "get" => {
            let path = args.first().context("get requires a path")?;
            let response = client.get(path).await?;
            print_response(&response)
        }
        "post" => {
            let path = args.first().context("post requires a path")?;
            let raw = args.get(1).context("post requires a JSON body")?;
            let body: serde_json::Value =
                serde_json::from_str(raw).context("Body is not valid JSON")?;
            let response = client.post(path, &body).await?;
            print_response(&response)
        }
        other => {
            eprintln!("{}", USAGE);
            anyhow::bail!("Unknown command: {}", other)
        }
    }
}

fn login(token: Option<&str>, store: &dyn CredentialStore) -> Result<()> {
    let token = match token {
        Some(token) => token.to_string(),
        None => rpassword::prompt_password("API token: ").context("Failed to read token")?,
    };
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("Token must not be empty");
    }

    store
        .write(ACCESS_TOKEN_KEY, token)
        .context("Failed to store token")?;
    info!("Token stored");
    println!("Logged in.");
    Ok(())
}

fn status(client: &ApiClient, store: &dyn CredentialStore) -> Result<()> {
    let config = client.config();
    println!("Environment: {}", config.environment());
    println!("Endpoint:    {}", config.endpoint(""));
    println!("Timeout:     {} ms", config.timeout().as_millis());

    match credential_source(store).context("Failed to read credential storage")? {
        Some(key) => println!("Credential:  stored under `{}`", key),
        None => println!("Credential:  none (run `journal login`)"),
    }
    Ok(())
}

fn print_response(response: &ApiResponse) -> Result<()> {
    match response.json::<serde_json::Value>() {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}
