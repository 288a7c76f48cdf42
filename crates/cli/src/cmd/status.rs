//! Query a running bridge

use anyhow::{Context, Result};
use cli_lib::util;
use owo_colors::OwoColorize;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const STATUS_TIMEOUT: Duration = Duration::from_secs(2);

/// Body of `GET /status`
#[derive(Debug, Deserialize)]
struct StatusReport {
    sessions: usize,
}

pub async fn run(root: &Path, port: Option<u16>) -> Result<()> {
    let port = match port {
        Some(port) => port,
        None => util::load_settings(root)?.server.port,
    };

    println!("{}", "Bridge Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Project:   {}", root.display().to_string().cyan());

    match fetch_status(port).await {
        Ok(status) => {
            println!("Listener:  {} on 127.0.0.1:{}", "Running ✓".green(), port);
            println!("Sessions:  {}", status.sessions);
            Ok(())
        }
        Err(e) if e.downcast_ref::<reqwest::Error>().is_some_and(|e| e.is_timeout()) => {
            println!("Listener:  {} on 127.0.0.1:{}", "Not responding".yellow(), port);
            Err(e).with_context(|| format!("Timed out waiting for 127.0.0.1:{}", port))
        }
        Err(e) => {
            println!("Listener:  {} on 127.0.0.1:{}", "Not running".red(), port);
            Err(e)
        }
    }
}

async fn fetch_status(port: u16) -> Result<StatusReport> {
    let client = Client::builder()
        .timeout(STATUS_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let url = format!("http://127.0.0.1:{}/status", port);

    client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Nothing listening on port {}", port))?
        .error_for_status()
        .with_context(|| format!("Port {} answered but is not a bridge", port))?
        .json::<StatusReport>()
        .await
        .context("Listener returned invalid status JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use server::{loopback, IngestionServer, SessionRegistry};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_fetch_status_from_listener() {
        let server = IngestionServer::bind(loopback(0), SessionRegistry::new())
            .await
            .unwrap();
        let port = server.local_addr().port();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serving = tokio::spawn(server.serve(async move {
            let _ = stop_rx.await;
        }));

        let status = fetch_status(port).await.unwrap();
        assert_eq!(status.sessions, 0);

        let _ = stop_tx.send(());
        serving.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_status_rejects_other_services() {
        let listener = tokio::net::TcpListener::bind(loopback(0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = axum::Router::new().route(
            "/status",
            axum::routing::get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        );
        let serving = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        assert!(fetch_status(port).await.is_err());
        serving.abort();
    }
}
