//! Minimal HTTP front-end for a controller.
//!
//! Every connection carries one `GET` request whose path selects the operation and
//! whose query string carries the arguments. Connections are served on their own
//! tasks, but all of them forward to the same [`ControllerHandle`], so the
//! controller's queue remains the only path to the bucket table.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bucket_core::{AcquireReply, BucketKey, ConfigUpdate, Decision, InspectReply};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::handle::{ControllerError, ControllerHandle};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 7400;

/// Longest request line accepted, in bytes, not counting the `\r\n`.
pub const MAX_REQUEST_LINE: usize = 8192;

/// How long a client gets to send its request line.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A response ready to be written back to the client.
#[derive(Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Response { status, body },
            Err(e) => Response::error(500, &e.to_string()),
        }
    }

    fn empty(status: u16) -> Self {
        Response {
            status,
            body: String::new(),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Response {
            status,
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            202 => "Accepted",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            414 => "URI Too Long",
            429 => "Too Many Requests",
            503 => "Service Unavailable",
            _ => "Internal Server Error",
        }
    }

    fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.reason(),
            self.body.len(),
            self.body
        )
    }
}

/// Serves one controller over HTTP.
#[derive(Clone)]
pub struct ControllerServer {
    handle: ControllerHandle,
    /// The port `start` binds to.
    pub port: u16,
    running: Arc<AtomicBool>,
}

impl ControllerServer {
    /// Creates a new `ControllerServer`.
    ///
    /// # Arguments
    /// * `handle` - The controller every request is forwarded to.
    /// * `port` - The port to listen on.
    pub fn new(handle: ControllerHandle, port: u16) -> Self {
        Self {
            handle,
            port,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Binds to `0.0.0.0:port` and serves until [`stop`](Self::stop) is called.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port)).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    ///
    /// The accept loop wakes up at least once a second to notice a stop request.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            addr = %listener.local_addr()?,
            namespace = self.handle.namespace(),
            "controller server listening"
        );

        while self.running.load(Ordering::SeqCst) {
            match tokio::time::timeout(Duration::from_secs(1), listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let handle = self.handle.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, addr, handle).await;
                    });
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "accept failed");
                }
                Err(_) => continue,
            }
        }

        info!("controller server stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn handle_connection(mut stream: TcpStream, peer_addr: SocketAddr, handle: ControllerHandle) {
    let line = match tokio::time::timeout(READ_TIMEOUT, read_request_line(&mut stream)).await {
        Ok(line) => line,
        Err(_) => {
            debug!(peer = %peer_addr, "timed out waiting for request line");
            return;
        }
    };

    let response = match line {
        Ok(None) => return,
        Ok(Some(line)) => {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let response = if parts.len() < 2 {
                Response::error(400, "malformed request line")
            } else if parts[0] != "GET" {
                Response::error(405, "only GET is supported")
            } else {
                route(parts[1], &handle).await
            };
            debug!(peer = %peer_addr, request = %line, status = response.status, "served request");
            response
        }
        Err(response) => {
            debug!(peer = %peer_addr, status = response.status, "rejected request line");
            response
        }
    };

    if let Err(e) = stream.write_all(response.to_http().as_bytes()).await {
        debug!(peer = %peer_addr, error = %e, "failed to write response");
    }
}

/// Reads until the first `\r\n` and returns the request line without it.
///
/// `Ok(None)` means the peer closed the connection without sending anything. A
/// line that is cut short or longer than [`MAX_REQUEST_LINE`] is never returned;
/// the error carries the response to send instead.
async fn read_request_line<R>(reader: &mut R) -> Result<Option<String>, Response>
where
    R: AsyncRead + Unpin,
{
    let mut received = Vec::new();
    let mut chunk = [0; 2048];
    loop {
        if let Some(end) = received.windows(2).position(|w| w == b"\r\n") {
            if end > MAX_REQUEST_LINE {
                return Err(Response::error(414, "request line too long"));
            }
            received.truncate(end);
            return Ok(Some(String::from_utf8_lossy(&received).into_owned()));
        }
        if received.len() > MAX_REQUEST_LINE {
            return Err(Response::error(414, "request line too long"));
        }

        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| Response::error(400, &e.to_string()))?;
        if n == 0 {
            if received.is_empty() {
                return Ok(None);
            }
            return Err(Response::error(400, "incomplete request line"));
        }
        received.extend_from_slice(&chunk[..n]);
    }
}

/// Maps a request path (with query string) onto a controller operation.
pub async fn route(path: &str, handle: &ControllerHandle) -> Response {
    let url = match Url::parse(&format!("http://localhost{}", path)) {
        Ok(u) => u,
        Err(_) => return Response::error(400, "invalid URL"),
    };
    let params: HashMap<_, _> = url.query_pairs().collect();

    match url.path() {
        "/acquire" => {
            let key = match key_param(&params) {
                Ok(k) => k,
                Err(r) => return r,
            };
            let cost = match number_param(&params, "cost") {
                Ok(c) => c.unwrap_or(1.0),
                Err(r) => return r,
            };
            match handle.acquire(key, cost).await {
                Ok(decision @ Decision::Allow(_)) => {
                    Response::json(200, &AcquireReply::from(decision))
                }
                Ok(Decision::Deny) => Response::json(429, &AcquireReply::from(Decision::Deny)),
                Err(e) => controller_error(e),
            }
        }
        "/inspect" => {
            let key = match key_param(&params) {
                Ok(k) => k,
                Err(r) => return r,
            };
            match handle.inspect(key).await {
                Ok(tokens) => Response::json(200, &InspectReply { tokens }),
                Err(e) => controller_error(e),
            }
        }
        "/adjust" => {
            let key = match key_param(&params) {
                Ok(k) => k,
                Err(r) => return r,
            };
            let amount = match number_param(&params, "amount") {
                Ok(Some(a)) => a,
                Ok(None) => return Response::error(400, "missing amount"),
                Err(r) => return r,
            };
            if handle.is_closed() {
                return controller_error(ControllerError::Closed);
            }
            handle.adjust_tokens(key, amount);
            Response::empty(202)
        }
        "/configure" => {
            let mut update = ConfigUpdate::default();
            for (field, slot) in [
                ("max_accumulated", &mut update.max_accumulated),
                ("refill", &mut update.refill),
                ("interval_ms", &mut update.interval_ms),
            ] {
                match number_param(&params, field) {
                    Ok(value) => *slot = value,
                    Err(r) => return r,
                }
            }
            if update.is_empty() {
                return Response::error(400, "no configuration fields given");
            }
            if handle.is_closed() {
                return controller_error(ControllerError::Closed);
            }
            handle.update_configuration(update);
            Response::empty(202)
        }
        _ => Response::error(404, "unknown operation"),
    }
}

type Params<'a> = HashMap<std::borrow::Cow<'a, str>, std::borrow::Cow<'a, str>>;

fn key_param(params: &Params<'_>) -> Result<BucketKey, Response> {
    let raw = params
        .get("key")
        .ok_or_else(|| Response::error(400, "missing key"))?;
    raw.parse()
        .map_err(|e: bucket_core::KeyParseError| Response::error(400, &e.to_string()))
}

fn number_param(params: &Params<'_>, name: &str) -> Result<Option<f64>, Response> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(Response::error(400, &format!("invalid {}", name))),
        },
    }
}

fn controller_error(e: ControllerError) -> Response {
    match e {
        ControllerError::InvalidCost(_) => Response::error(400, &e.to_string()),
        ControllerError::Closed => Response::error(503, &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use bucket_core::{Configuration, ManualClock};

    fn spawn() -> ControllerHandle {
        let config = Configuration::builder()
            .namespace("server-test")
            .max_accumulated(2.0)
            .refill(1.0)
            .interval_ms(10.0)
            .build()
            .unwrap();
        Controller::new(config, Arc::new(ManualClock::new(0)))
            .spawn()
            .0
    }

    #[tokio::test]
    async fn test_acquire_allow_then_deny() {
        let handle = spawn();
        let r = route("/acquire?key=10.0.0.1&cost=2", &handle).await;
        assert_eq!(r.status, 200);
        assert_eq!(r.body, r#"{"allowed":true,"tokens":0.0}"#);

        let r = route("/acquire?key=10.0.0.1", &handle).await;
        assert_eq!(r.status, 429);
        assert_eq!(r.body, r#"{"allowed":false}"#);
    }

    #[tokio::test]
    async fn test_composite_key_in_query() {
        let handle = spawn();
        let r = route("/acquire?key=%28%3Aupload%2C%2042%29&cost=1", &handle).await;
        assert_eq!(r.status, 200);
        let tokens = handle
            .inspect(BucketKey::composite([BucketKey::tag("upload"), BucketKey::Int(42)]))
            .await
            .unwrap();
        assert_eq!(tokens, 1.0);
    }

    #[tokio::test]
    async fn test_adjust_and_inspect() {
        let handle = spawn();
        let r = route("/adjust?key=u&amount=-5", &handle).await;
        assert_eq!(r.status, 202);
        assert!(r.body.is_empty());

        let r = route("/inspect?key=u", &handle).await;
        assert_eq!(r.status, 200);
        assert_eq!(r.body, r#"{"tokens":0.0}"#);
    }

    #[tokio::test]
    async fn test_configure() {
        let handle = spawn();
        let r = route("/configure?max_accumulated=10", &handle).await;
        assert_eq!(r.status, 202);
        assert_eq!(handle.inspect("new").await, Ok(10.0));

        let r = route("/configure", &handle).await;
        assert_eq!(r.status, 400);
        let r = route("/configure?refill=abc", &handle).await;
        assert_eq!(r.status, 400);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let handle = spawn();
        assert_eq!(route("/acquire", &handle).await.status, 400);
        assert_eq!(route("/acquire?key=a&cost=-1", &handle).await.status, 400);
        assert_eq!(route("/acquire?key=(a", &handle).await.status, 400);
        assert_eq!(route("/adjust?key=a", &handle).await.status, 400);
        assert_eq!(route("/adjust?key=a&amount=inf", &handle).await.status, 400);
        assert_eq!(route("/nope", &handle).await.status, 404);
    }

    #[tokio::test]
    async fn test_closed_controller() {
        let handle = spawn();
        handle.shutdown();
        assert_eq!(route("/inspect?key=a", &handle).await.status, 503);
        assert_eq!(route("/adjust?key=a&amount=1", &handle).await.status, 503);
    }

    #[tokio::test]
    async fn test_request_line_arrives_in_pieces() {
        let mut reader = (&b"GET /acquire?key="[..])
            .chain(&b"abc&cost=2 HTTP/1.1\r\n"[..])
            .chain(&b"Host: localhost\r\n\r\n"[..]);
        let line = read_request_line(&mut reader).await.expect("Should read");
        assert_eq!(line.as_deref(), Some("GET /acquire?key=abc&cost=2 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_partial_request_line_is_rejected() {
        let mut reader = &b"GET /acquire?key=abc&co"[..];
        let err = read_request_line(&mut reader).await.unwrap_err();
        assert_eq!(err.status, 400);

        let mut reader = &b""[..];
        assert_eq!(read_request_line(&mut reader).await, Ok(None));
    }

    #[tokio::test]
    async fn test_oversized_request_line_is_rejected() {
        let request = format!("GET /acquire?key={} HTTP/1.1\r\n", "a".repeat(MAX_REQUEST_LINE));
        let err = read_request_line(&mut request.as_bytes()).await.unwrap_err();
        assert_eq!(err.status, 414);
        assert!(err.to_http().starts_with("HTTP/1.1 414 URI Too Long\r\n"));

        // Same without a line ending at all.
        let unterminated = "a".repeat(MAX_REQUEST_LINE * 2);
        let err = read_request_line(&mut unterminated.as_bytes()).await.unwrap_err();
        assert_eq!(err.status, 414);
    }

    #[test]
    fn test_http_framing() {
        let text = Response::json(429, &AcquireReply::from(Decision::Deny)).to_http();
        assert!(text.starts_with("HTTP/1.1 429 Too Many Requests\r\n"));
        assert!(text.contains("Content-Length: 17\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"allowed\":false}"));
    }
}
