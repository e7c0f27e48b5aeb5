pub mod gemini;

use std::net::SocketAddr;
use std::time::Duration;

use config::Config;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::Value;
use server::ServeConfig;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// How long a test waits for a stream to reach `[DONE]`.
const STREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

/// A fully read event stream.
#[derive(Debug)]
pub struct StreamResponse {
    pub status: u16,
    /// The `data:` payloads in order, including the final `[DONE]`.
    pub events: Vec<String>,
}

impl StreamResponse {
    /// The payloads parsed as JSON, without the `[DONE]` sentinel.
    pub fn json(&self) -> Vec<Value> {
        self.events
            .iter()
            .filter(|data| data.as_str() != "[DONE]")
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    /// The id announced by a `conversationId` event.
    pub fn conversation_id(&self) -> Option<String> {
        self.json()
            .iter()
            .find_map(|event| event["conversationId"].as_str().map(str::to_string))
    }
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send a POST request to the given path with JSON body
    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    /// POSTs `body` and reads the event stream until the server closes it.
    pub async fn stream(&self, path: &str, body: &Value) -> StreamResponse {
        let response = self.post(path, body).await.unwrap();
        let status = response.status().as_u16();

        let mut stream = response.bytes_stream().eventsource();
        let mut events = Vec::new();

        let read = async {
            while let Some(event) = stream.next().await {
                let event = event.unwrap();
                let done = event.data == "[DONE]";

                events.push(event.data);

                if done {
                    break;
                }
            }
        };

        timeout(STREAM_TIMEOUT, read).await.unwrap();

        StreamResponse { status, events }
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    shutdown: CancellationToken,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server with the given TOML configuration
    pub async fn start(config_toml: &str) -> Self {
        let config: Config = toml::from_str(config_toml).unwrap();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let shutdown = CancellationToken::new();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            shutdown_signal: shutdown.clone(),
        };

        let handle = tokio::spawn(async move {
            // Drop the listener so the server can bind to the address
            drop(listener);

            if let Err(e) = server::serve(serve_config).await {
                eprintln!("Server failed to start: {e}");
            }
        });

        let client = TestClient::new(format!("http://{address}"));

        // Wait until the server accepts connections
        for _ in 0..50 {
            if let Ok(Ok(_)) = timeout(
                Duration::from_millis(100),
                client.client.get(format!("http://{address}/")).send(),
            )
            .await
            {
                break;
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestServer {
            client,
            address,
            shutdown,
            _handle: handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
