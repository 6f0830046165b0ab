//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use msm_session::{InMemoryStore, RegistryConfig, SessionRegistry};
use msm_server::{Server, ServerConfig};
use reqwest::Client;
use reqwest::header::{COOKIE, SET_COOKIE};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client for this server.
    pub client: Client,
    /// The registry behind the server.
    pub registry: Arc<SessionRegistry>,
    /// The backing store behind the registry.
    pub store: Arc<InMemoryStore>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a new test server on an ephemeral port.
    pub async fn start() -> Result<Self> {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(
            RegistryConfig::for_app("it"),
            store.clone(),
        )?);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(false);

        let (tx, rx) = oneshot::channel::<()>();
        let server = Server::new(registry.clone(), config);
        let handle = tokio::spawn(async move {
            let _ = server
                .run_with_shutdown(listener, async {
                    let _ = rx.await;
                })
                .await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            registry,
            store,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET `path`, sending `cookie` when given.
    pub fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(self.client.get(format!("{}{}", self.base_url(), path)), cookie)
    }

    /// POST `path`, sending `cookie` when given.
    pub fn post(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(self.client.post(format!("{}{}", self.base_url(), path)), cookie)
    }

    /// PUT `path`, sending `cookie` when given.
    pub fn put(&self, path: &str, cookie: Option<&str>) -> reqwest::RequestBuilder {
        with_cookie(self.client.put(format!("{}{}", self.base_url(), path)), cookie)
    }

    /// Stop accepting requests and wait for the server task to finish.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            timeout(Duration::from_secs(5), handle).await??;
        }
        Ok(())
    }
}

fn with_cookie(builder: reqwest::RequestBuilder, cookie: Option<&str>) -> reqwest::RequestBuilder {
    match cookie {
        Some(cookie) => builder.header(COOKIE, cookie),
        None => builder,
    }
}

/// The `name=value` part of a response's `Set-Cookie` header.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    let header = response.headers().get(SET_COOKIE)?.to_str().ok()?;
    header.split(';').next().map(str::to_string)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
