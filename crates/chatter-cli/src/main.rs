mod forms;
mod screens;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use chatter_client::{
    AuthConfig, AuthGateway, CallBackend, CallCredentials, CallInvocation, CallLauncher,
    ChannelDirectory, ImageBucket, MessagePipeline, StorageConfig,
};
use chatter_notify::{Notifier, NotifyConfig, ServiceAccountKey};
use chatter_store::Store;

use screens::Screens;

/// The terminal cannot embed the vendor call UI; it prints the room
/// parameters the prebuilt client needs instead.
struct TerminalCallBackend;

impl CallBackend for TerminalCallBackend {
    fn launch(&self, invocation: CallInvocation) -> Result<()> {
        println!(
            "call ready: room {} as {} ({:?} template, app {})",
            invocation.call_id, invocation.user_name, invocation.kind, invocation.app_id
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatter=debug".into()),
        )
        .init();

    // Config
    let api_key = require_env("CHATTER_API_KEY")?;
    let database_url = require_env("CHATTER_DATABASE_URL")?;
    let storage_url = require_env("CHATTER_STORAGE_URL")?;
    let storage_key = require_env("CHATTER_STORAGE_KEY")?;
    let key_path =
        std::env::var("CHATTER_SERVICE_ACCOUNT").unwrap_or_else(|_| "chatter_key.json".into());
    let device_token = std::env::var("CHATTER_DEVICE_TOKEN").ok();
    let call_app_id: i64 = std::env::var("CHATTER_CALL_APP_ID")
        .unwrap_or_else(|_| "0".into())
        .parse()
        .context("CHATTER_CALL_APP_ID must be numeric")?;
    let call_app_sign = std::env::var("CHATTER_CALL_APP_SIGN").unwrap_or_default();

    // Shared clients
    let key = ServiceAccountKey::from_file(Path::new(&key_path))?;
    let notifier = Arc::new(Notifier::new(key, NotifyConfig::default())?);
    let store = Arc::new(Store::new(database_url));

    let auth = AuthGateway::new(AuthConfig {
        api_key,
        endpoint: None,
    });
    let directory = ChannelDirectory::new(store.clone());
    let bucket = ImageBucket::new(StorageConfig {
        base_url: storage_url,
        anon_key: storage_key,
        bucket: None,
    });
    let pipeline = MessagePipeline::new(store, bucket, notifier.clone(), device_token);
    let calls = CallLauncher::new(
        CallCredentials {
            app_id: call_app_id,
            app_sign: call_app_sign,
        },
        Arc::new(TerminalCallBackend),
    );

    info!("chatter client starting");

    Screens::new(auth, directory, pipeline, calls).run().await
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}
