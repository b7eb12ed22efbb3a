//! Client walkthrough against the `users_api` server example.
//!
//! ```text
//! cargo run -p tandem-server --example users_api &
//! cargo run -p tandem --example client
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tandem::auth::ApiKeyAuth;
use tandem::cache::MemoryCache;
use tandem::{
    ApiClient, ClientConfig, Error, HyperClient, Method, RequestOptions, Result,
    create_client_with_config,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    name: String,
}

async fn crud(client: &ApiClient<HyperClient>) -> Result<()> {
    let users: Vec<User> = client
        .get("users", RequestOptions::new())
        .await?
        .error_for_status()?
        .json()?;
    info!(count = users.len(), "listed users");

    let created: User = client
        .post(
            "users",
            RequestOptions::new()
                .json(json!({"name": "John Doe", "email": "john.doe@example.com"})),
        )
        .await?
        .error_for_status()?
        .json()?;
    info!(id = created.id, name = created.name, "created user");

    let path = format!("users/{}", created.id);
    let updated: User = client
        .put(
            &path,
            RequestOptions::new()
                .json(json!({"name": "John Smith", "email": "john.smith@example.com"})),
        )
        .await?
        .error_for_status()?
        .json()?;
    info!(name = updated.name, "updated user");

    client
        .delete(&path, RequestOptions::new())
        .await?
        .error_for_status()?;
    info!(id = created.id, "deleted user");
    Ok(())
}

async fn cached(client: &ApiClient<HyperClient>) -> Result<()> {
    for attempt in ["first", "second"] {
        let response = client
            .get("users", RequestOptions::new().query("name", "jane"))
            .await?
            .error_for_status()?;
        let users: Vec<User> = response.json()?;
        info!(attempt, count = users.len(), "filtered users");
    }

    let lines = client
        .stream(Method::Get, "openapi.json", RequestOptions::new())
        .await?
        .lines();
    futures_util::pin_mut!(lines);
    let mut count = 0_usize;
    while let Some(line) = lines.next().await {
        count += line?.len();
    }
    info!(bytes = count, "streamed the API document");
    Ok(())
}

async fn errors() -> Result<()> {
    let anonymous = create_client_with_config(BASE_URL, ClientConfig::default())?;

    let attempts = [
        anonymous.delete("users/1", RequestOptions::new()).await,
        anonymous.get("users/999", RequestOptions::new()).await,
        anonymous
            .post("users", RequestOptions::new().json(json!({"invalid": "data"})))
            .await,
    ];
    for attempt in attempts {
        match attempt.and_then(tandem::Response::error_for_status) {
            Ok(response) => info!(status = response.status(), "unexpected success"),
            Err(err @ (Error::Authentication { .. } | Error::ResourceNotFound { .. })) => {
                info!(code = err.code(), "caught: {err}");
            }
            Err(err) => warn!(code = err.code(), "caught: {err}"),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::builder()
        .timeout(Duration::from_secs(10))
        .max_retries(3)
        .build();
    let client = create_client_with_config(BASE_URL, config)?
        .with_auth(ApiKeyAuth::new("secret-api-key"))
        .with_cache(MemoryCache::with_max_size(100));

    crud(&client).await?;
    cached(&client).await?;
    errors().await
}
