use std::{sync::Arc, time::Duration};

use aad_connect::{ConnectionParams, CredentialInjector, AAD_OPTIONS};
use aad_tokens::{sources::ClientSecretTokenSource, ClientId, ClientSecret, TenantId, TokenCache};
use clap::Parser;
use serde_json::json;

#[derive(Debug, Parser)]
struct Opts {
    /// The database host to connect to
    #[arg(long, env = "PGHOST")]
    host: String,

    /// The database user, usually the Azure AD principal name
    #[arg(long, env = "PGUSER")]
    user: String,

    /// The client ID of the service principal
    #[arg(long, env = "SP_CLIENT_ID")]
    client_id: ClientId,

    /// The client secret of the service principal
    #[arg(long, env = "SP_CLIENT_SECRET", hide_env_values = true)]
    client_secret: ClientSecret,

    /// The tenant the service principal belongs to
    #[arg(long, env = "SP_TENANT_ID")]
    tenant_id: TenantId,

    /// Refresh the token when fewer than this many minutes remain
    #[arg(long, env = "REFRESH_BEFORE_MINUTES", default_value_t = aad_connect::DEFAULT_REFRESH_BEFORE_MINUTES)]
    refresh_before_minutes: u64,

    /// Number of connection attempts to simulate
    #[arg(long, default_value_t = 3)]
    attempts: u32,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let client = reqwest::Client::builder()
        .https_only(true)
        .timeout(Duration::from_secs(10))
        .build()?;

    let cache = TokenCache::new(ClientSecretTokenSource::new(client));
    let injector = CredentialInjector::new(Arc::new(cache));

    let mut params = ConnectionParams::new();
    params.insert("HOST", opts.host);
    params.insert("PORT", 5432);
    params.insert("USER", opts.user);
    params.insert("OPTIONS", json!({ "sslmode": "require" }));
    params.insert(
        AAD_OPTIONS,
        json!({
            "SP_CLIENT_ID": opts.client_id.as_str(),
            "SP_CLIENT_SECRET": opts.client_secret.as_str(),
            "SP_TENANT_ID": opts.tenant_id.as_str(),
            "REFRESH_BEFORE_MINUTES": opts.refresh_before_minutes,
        }),
    );

    for attempt in 1..=opts.attempts {
        let params = injector.inject(params.clone()).await?;
        let credential = injector
            .cache()
            .current()
            .ok_or_else(|| color_eyre::eyre::eyre!("no credential cached after injection"))?;

        tracing::info!(
            attempt,
            token = format_args!("{:#?}", credential.access_token()),
            until_expired = credential.until_expired().0,
            ?params,
            "built connection parameters"
        );
    }

    Ok(())
}
