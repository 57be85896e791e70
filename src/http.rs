//! Provides the HTTP transport which connects cache peers.
//!
//! An [HttpPeerPool] covers both sides of the wire: as a *client* it implements
//! [PeerPicker] (using a consistent hashing [HashRing](crate::ring::HashRing) over the
//! configured peer addresses) and hands out per-peer [PeerGetter]s which fetch values
//! via `GET {peer}/_cache/{group}/{key}`. As a *server* it answers exactly these
//! requests by resolving the group in its [GroupRegistry](crate::registry::GroupRegistry)
//! and replying with the raw value bytes.
//!
//! Note that a pool never picks its own address as a peer - a key owned by the local
//! node is resolved locally by the group itself.
//!
//! # Examples
//! ```no_run
//! # use std::sync::Arc;
//! # use callisto::http::HttpPeerPool;
//! # use callisto::peers::FnLoader;
//! # use callisto::registry::GroupRegistry;
//! # #[tokio::main]
//! # async fn main() {
//! let registry = GroupRegistry::new();
//! let group = registry
//!     .create_group("scores", 2 << 10, Arc::new(FnLoader::new(|key: &str| {
//!         Ok(key.as_bytes().to_vec())
//!     })))
//!     .unwrap();
//!
//! // Wire this node into a three node cluster...
//! let pool = HttpPeerPool::new(registry, "http://localhost:8001");
//! pool.set_peers([
//!     "http://localhost:8001",
//!     "http://localhost:8002",
//!     "http://localhost:8003",
//! ]);
//! group.register_peers(pool.clone()).unwrap();
//!
//! // ...and serve the peer endpoint.
//! pool.serve(([127, 0, 0, 1], 8001).into()).await.unwrap();
//! # }
//! ```
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::header::HeaderValue;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Request, Response, StatusCode, Uri};

use crate::peers::{FetchRequest, FetchResponse, PeerGetter, PeerPicker};
use crate::registry::GroupRegistry;
use crate::ring::HashRing;

/// The number of virtual replicas each peer contributes to the hash ring.
pub const DEFAULT_REPLICAS: usize = 50;

/// The path prefix under which peer requests are served.
const BASE_PATH: &str = "/_cache/";

struct PoolState {
    ring: HashRing,
    clients: HashMap<String, Arc<HttpPeerClient>>,
}

/// Routes keys to their owning peers and serves peer requests for local groups.
pub struct HttpPeerPool {
    self_address: String,
    registry: Arc<GroupRegistry>,
    state: RwLock<PoolState>,
}

impl HttpPeerPool {
    /// Creates a new pool for the node reachable at **self_address**
    /// (e.g. `http://localhost:8001`), serving groups out of the given registry.
    ///
    /// Note that the pool is unaware of any peers (including itself) until
    /// [set_peers](HttpPeerPool::set_peers) is called.
    pub fn new(registry: Arc<GroupRegistry>, self_address: &str) -> Arc<Self> {
        Arc::new(HttpPeerPool {
            self_address: self_address.trim_end_matches('/').to_owned(),
            registry,
            state: RwLock::new(PoolState {
                ring: HashRing::with_default_hash(DEFAULT_REPLICAS),
                clients: HashMap::new(),
            }),
        })
    }

    /// Replaces the set of peer addresses this pool routes to.
    ///
    /// The hash ring and the per-peer clients are rebuilt from scratch, so this can be
    /// used to re-wire the cluster topology. The pool's own address should be included
    /// so that all nodes agree on the same ring.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ring = HashRing::with_default_hash(DEFAULT_REPLICAS);
        let mut clients = HashMap::new();

        for peer in peers {
            let peer = peer.as_ref().trim_end_matches('/');
            ring.add([peer]);
            let _ = clients.insert(peer.to_owned(), Arc::new(HttpPeerClient::new(peer)));
        }

        let mut state = self.state.write().unwrap();
        state.ring = ring;
        state.clients = clients;
    }

    /// Answers a single peer request.
    ///
    /// Expects a path of the form `/_cache/{group}/{key}` (with percent-escaped
    /// segments) and replies with the raw value bytes. Unknown paths yield 404,
    /// malformed ones 400 and load failures 500.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let path = request.uri().path().to_owned();

        let remainder = match path.strip_prefix(BASE_PATH) {
            Some(remainder) => remainder,
            None => return status_response(StatusCode::NOT_FOUND, "No such endpoint."),
        };

        let (group_name, key) = match remainder.split_once('/') {
            Some((group_name, key)) if !group_name.is_empty() && !key.is_empty() => {
                (unescape_path_segment(group_name), unescape_path_segment(key))
            }
            _ => {
                return status_response(
                    StatusCode::BAD_REQUEST,
                    "Expected a path of the form /_cache/{group}/{key}.",
                )
            }
        };

        let group = match self.registry.lookup(&group_name) {
            Some(group) => group,
            None => {
                return status_response(StatusCode::NOT_FOUND, "No such cache group.")
            }
        };

        match group.get(&key).await {
            Ok(value) => {
                let mut response = Response::new(Body::from(value.byte_slice()));
                let _ = response.headers_mut().insert(
                    hyper::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                response
            }
            Err(error) => {
                log::error!(
                    "Failed to resolve '{}' in group '{}' for a peer: {:#}",
                    key,
                    group_name,
                    error
                );
                status_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{:#}", error))
            }
        }
    }

    /// Binds the peer endpoint to the given address and serves it until the server
    /// fails or the surrounding task is cancelled.
    pub async fn serve(self: Arc<Self>, address: SocketAddr) -> anyhow::Result<()> {
        let pool = self;
        let make_service = make_service_fn(move |_connection| {
            let pool = pool.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    let pool = pool.clone();
                    async move { Ok::<_, Infallible>(pool.handle(request).await) }
                }))
            }
        });

        log::info!("Serving the cache peer endpoint on {}...", address);
        hyper::Server::try_bind(&address)
            .context("Failed to bind the cache peer endpoint.")?
            .serve(make_service)
            .await
            .context("The cache peer endpoint terminated abnormally.")
    }
}

impl PeerPicker for HttpPeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let state = self.state.read().unwrap();
        match state.ring.get(key) {
            Some(peer) if peer != self.self_address => {
                log::debug!("Routing key '{}' to peer {}...", key, peer);
                state.clients.get(peer).map(|client| {
                    let getter: Arc<dyn PeerGetter> = client.clone();
                    getter
                })
            }
            _ => None,
        }
    }
}

/// Fetches values from one specific peer via HTTP.
struct HttpPeerClient {
    base_url: String,
    client: Client<HttpConnector>,
}

impl HttpPeerClient {
    fn new(base_url: &str) -> Self {
        HttpPeerClient {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl PeerGetter for HttpPeerClient {
    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<FetchResponse> {
        let url = format!(
            "{}{}{}/{}",
            self.base_url,
            BASE_PATH,
            escape_path_segment(&request.group),
            escape_path_segment(&request.key)
        );
        let uri = Uri::from_str(&url).context("Invalid peer URL.")?;

        let response = self
            .client
            .get(uri)
            .await
            .with_context(|| format!("Failed to reach peer {}.", self.base_url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Peer {} responded with status {}.",
                self.base_url,
                response.status()
            ));
        }

        let value = hyper::body::to_bytes(response.into_body())
            .await
            .with_context(|| format!("Failed to read the response of peer {}.", self.base_url))?;

        Ok(FetchResponse { value })
    }
}

fn status_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_owned()));
    *response.status_mut() = status;
    response
}

fn escape_path_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_' | b'.' | b'~' => {
                escaped.push(byte as char)
            }
            _ => escaped.push_str(&format!("%{:02X}", byte)),
        }
    }

    escaped
}

fn unescape_path_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());

    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_value(bytes[index + 1]), hex_value(bytes[index + 2]))
            {
                decoded.push(high * 16 + low);
                index += 3;
                continue;
            }
        }

        decoded.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{escape_path_segment, unescape_path_segment, HttpPeerPool};
    use crate::group::CacheGroup;
    use crate::peers::FnLoader;
    use crate::registry::GroupRegistry;
    use hyper::{Body, Request, StatusCode};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    lazy_static::lazy_static! {
        /// Serializes all tests which bind fixed local ports.
        static ref SHARED_TEST_RESOURCES: Mutex<()> = Mutex::new(());
    }

    #[test]
    fn path_segments_survive_escaping() {
        let segment = "Tom & Jerry/100%";
        let escaped = escape_path_segment(segment);

        assert_eq!(escaped.contains('/'), false);
        assert_eq!(escaped.contains(' '), false);
        assert_eq!(unescape_path_segment(&escaped), segment);
    }

    #[test]
    fn malformed_escapes_pass_through() {
        assert_eq!(unescape_path_segment("100%"), "100%");
        assert_eq!(unescape_path_segment("%zz"), "%zz");
        assert_eq!(unescape_path_segment("%41"), "A");
    }

    fn scores_pool() -> Arc<HttpPeerPool> {
        let registry = GroupRegistry::new();
        let _ = registry
            .create_group(
                "scores",
                1024,
                Arc::new(FnLoader::new(|key: &str| match key {
                    "Tom" => Ok(b"630".to_vec()),
                    _ => Err(anyhow::anyhow!("{} not exist", key)),
                })),
            )
            .unwrap();

        HttpPeerPool::new(registry, "http://localhost:1")
    }

    async fn body_of(response: hyper::Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn known_keys_are_served() {
        let pool = scores_pool();

        let request = Request::builder()
            .uri("/_cache/scores/Tom")
            .body(Body::empty())
            .unwrap();
        let response = pool.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/octet-stream"
        );
        assert_eq!(body_of(response).await, "630");
    }

    #[tokio::test]
    async fn unknown_paths_and_groups_are_rejected() {
        let pool = scores_pool();

        let request = Request::builder()
            .uri("/other/scores/Tom")
            .body(Body::empty())
            .unwrap();
        assert_eq!(pool.handle(request).await.status(), StatusCode::NOT_FOUND);

        let request = Request::builder()
            .uri("/_cache/ratings/Tom")
            .body(Body::empty())
            .unwrap();
        assert_eq!(pool.handle(request).await.status(), StatusCode::NOT_FOUND);

        let request = Request::builder()
            .uri("/_cache/scores")
            .body(Body::empty())
            .unwrap();
        assert_eq!(pool.handle(request).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn load_failures_are_reported_as_server_errors() {
        let pool = scores_pool();

        let request = Request::builder()
            .uri("/_cache/scores/Unknown")
            .body(Body::empty())
            .unwrap();
        let response = pool.handle(request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await.contains("Unknown not exist"), true);
    }

    #[tokio::test]
    async fn escaped_keys_are_decoded_before_loading() {
        let registry = GroupRegistry::new();
        let _ = registry
            .create_group(
                "echo",
                1024,
                Arc::new(FnLoader::new(|key: &str| Ok(key.as_bytes().to_vec()))),
            )
            .unwrap();
        let pool = HttpPeerPool::new(registry, "http://localhost:1");

        let request = Request::builder()
            .uri("/_cache/echo/Tom%20Jones")
            .body(Body::empty())
            .unwrap();
        let response = pool.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "Tom Jones");
    }

    fn start_node(port: u16, tag: &'static str, peers: &[&str]) -> Arc<CacheGroup> {
        let registry = GroupRegistry::new();
        let group = registry
            .create_group(
                "scores",
                1024,
                Arc::new(FnLoader::new(move |key: &str| {
                    Ok(format!("{}:{}", tag, key).into_bytes())
                })),
            )
            .unwrap();

        let pool = HttpPeerPool::new(registry, &format!("http://127.0.0.1:{}", port));
        pool.set_peers(peers.iter().copied());
        group.register_peers(pool.clone()).unwrap();

        let _ = tokio::spawn(pool.serve(([127, 0, 0, 1], port).into()));

        group
    }

    #[tokio::test]
    async fn values_are_fetched_from_their_owning_peer() {
        let _guard = SHARED_TEST_RESOURCES.lock().unwrap();

        let peers = ["http://127.0.0.1:17411", "http://127.0.0.1:17412"];
        let node_a = start_node(17411, "A", &peers);
        let node_b = start_node(17412, "B", &peers);

        // Give both endpoints a moment to bind...
        tokio::time::sleep(Duration::from_millis(100)).await;

        for key in ["Tom", "Jack", "Sam", "Alice", "Bob"] {
            let from_a = node_a.get(key).await.unwrap().to_string();
            let from_b = node_b.get(key).await.unwrap().to_string();

            // Whichever node we ask, the value is produced by the key's owner - so
            // both nodes must agree and the value carries exactly one node's tag.
            assert_eq!(from_a, from_b);
            assert_eq!(
                from_a == format!("A:{}", key) || from_a == format!("B:{}", key),
                true
            );
        }
    }
}
