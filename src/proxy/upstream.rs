//! Upstream connection and request forwarding
//!
//! Each forwarded request gets a fresh connection to its backend, wrapped
//! in TLS for `https` backends. The request goes out with
//! `Connection: close`, and the response is read in full before it is
//! relayed to the client.

use crate::http::headers::Headers;
use crate::http::parser::{ChunkedDecoder, ParseError, parse_response_head};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::proxy::backend::Backend;
use bytes::{Buf, BytesMut};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

/// Headers that describe a single hop and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "TE",
    "Trailer",
    "Transfer-Encoding",
    "Upgrade",
];

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to connect to backend: {0}")]
    Connect(#[source] std::io::Error),

    #[error("connecting to backend timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("backend host {0:?} is not a valid TLS server name")]
    ServerName(String),

    #[error("TLS handshake with backend failed: {0}")]
    Tls(#[source] std::io::Error),

    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("I/O error while talking to backend: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response from backend: {0}")]
    Protocol(#[from] ParseError),

    #[error("backend closed the connection before the response was complete")]
    ClosedEarly,
}

impl ForwardError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ForwardError::ConnectTimeout(_) | ForwardError::Timeout(_))
    }
}

/// Relays one request/response pair to a backend
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    /// Connection timeout duration
    connection_timeout: Duration,

    /// Bound on writing the request and reading the full response
    request_timeout: Duration,

    /// Client settings for `https` backends
    tls_config: Arc<ClientConfig>,
}

impl ProxyHandler {
    /// Handler that trusts the bundled Mozilla root certificates for
    /// `https` backends.
    pub fn new(connection_timeout: Duration, request_timeout: Duration) -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self::with_tls_config(connection_timeout, request_timeout, Arc::new(tls_config))
    }

    pub fn with_tls_config(
        connection_timeout: Duration,
        request_timeout: Duration,
        tls_config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            connection_timeout,
            request_timeout,
            tls_config,
        }
    }

    /// Forward `request` to `backend` and return the backend's response.
    ///
    /// There is no retry: a failure here is the result of this request.
    pub async fn forward(
        &self,
        backend: &Backend,
        request: &Request,
        peer: Option<SocketAddr>,
    ) -> Result<Response, ForwardError> {
        let request_bytes = self.build_http_request(request, backend, peer);
        let head_request = request.method == Method::HEAD;

        // The connect timeout covers the TLS handshake too.
        if backend.is_tls() {
            let stream = timeout(self.connection_timeout, self.connect_tls(backend))
                .await
                .map_err(|_| ForwardError::ConnectTimeout(self.connection_timeout))??;
            self.exchange(stream, &request_bytes, head_request).await
        } else {
            let stream = timeout(self.connection_timeout, connect_tcp(backend))
                .await
                .map_err(|_| ForwardError::ConnectTimeout(self.connection_timeout))??;
            self.exchange(stream, &request_bytes, head_request).await
        }
    }

    async fn connect_tls(&self, backend: &Backend) -> Result<TlsStream<TcpStream>, ForwardError> {
        let server_name = ServerName::try_from(backend.host())
            .map_err(|_| ForwardError::ServerName(backend.host().to_string()))?
            .to_owned();
        let stream = connect_tcp(backend).await?;

        let stream = TlsConnector::from(Arc::clone(&self.tls_config))
            .connect(server_name, stream)
            .await
            .map_err(ForwardError::Tls)?;

        tracing::trace!(backend = %backend, "TLS session established");
        Ok(stream)
    }

    async fn exchange<S>(
        &self,
        stream: S,
        request_bytes: &[u8],
        head_request: bool,
    ) -> Result<Response, ForwardError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        timeout(
            self.request_timeout,
            send_request_and_receive_response(stream, request_bytes, head_request),
        )
        .await
        .map_err(|_| ForwardError::Timeout(self.request_timeout))?
    }

    /// Build the request bytes sent to the backend.
    ///
    /// Method, target, headers and body pass through unchanged except for:
    /// `Host` set to the backend, hop-by-hop headers dropped,
    /// `Connection: close`, an exact `Content-Length`, and the client address
    /// appended to `X-Forwarded-For`.
    pub fn build_http_request(
        &self,
        request: &Request,
        backend: &Backend,
        peer: Option<SocketAddr>,
    ) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(512 + request.body.len());

        // Request line
        buffer.extend_from_slice(
            format!(
                "{} {} HTTP/1.1\r\n",
                request.method,
                origin_form(&request.path)
            )
            .as_bytes(),
        );

        let mut headers = request.headers.clone();
        strip_hop_by_hop(&mut headers);

        headers.insert("Host", backend.authority());

        if let Some(peer) = peer {
            let client_ip = peer.ip().to_string();
            let forwarded_for = match join_values(&headers, "X-Forwarded-For") {
                Some(prior) => format!("{}, {}", prior, client_ip),
                None => client_ip,
            };
            headers.insert("X-Forwarded-For", forwarded_for);
        }

        // Chunked uploads were decoded on the way in.
        if !request.body.is_empty()
            || request.headers.contains("Content-Length")
            || request.headers.contains("Transfer-Encoding")
        {
            headers.insert("Content-Length", request.body.len().to_string());
        }

        headers.insert("Connection", "close");

        for (key, value) in headers.iter() {
            buffer.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }

        // End of headers
        buffer.extend_from_slice(b"\r\n");
        buffer.extend_from_slice(&request.body);

        buffer
    }

    /// Response sent to the client when forwarding failed.
    pub fn error_response(error: &ForwardError) -> Response {
        if error.is_timeout() {
            Response::text(
                StatusCode::GATEWAY_TIMEOUT,
                "504 Gateway Timeout\n\nThe backend server did not respond in time.\n",
            )
        } else {
            Response::text(
                StatusCode::BAD_GATEWAY,
                "502 Bad Gateway\n\nFailed to reach the backend server.\n",
            )
        }
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut Headers) {
    let named: Vec<String> = headers
        .get_all("Connection")
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn join_values(headers: &Headers, name: &str) -> Option<String> {
    let values: Vec<&str> = headers.get_all(name).collect();
    (!values.is_empty()).then(|| values.join(", "))
}

/// Reduce an absolute-form target to its path and query, byte for byte.
/// An empty target becomes "/".
fn origin_form(target: &str) -> String {
    if target.is_empty() {
        return "/".to_string();
    }

    let after_scheme = ["http://", "https://"].iter().find_map(|scheme| {
        target
            .get(..scheme.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
            .map(|_| &target[scheme.len()..])
    });

    match after_scheme {
        // The authority ends at the first '/' or '?'.
        Some(rest) => match rest.find(['/', '?']) {
            Some(i) if rest[i..].starts_with('?') => format!("/{}", &rest[i..]),
            Some(i) => rest[i..].to_string(),
            None => "/".to_string(),
        },
        None => target.to_string(),
    }
}

async fn connect_tcp(backend: &Backend) -> Result<TcpStream, ForwardError> {
    let stream = TcpStream::connect(backend.authority())
        .await
        .map_err(ForwardError::Connect)?;
    tracing::trace!(backend = %backend, "Connected to backend");
    Ok(stream)
}

async fn send_request_and_receive_response<S>(
    mut stream: S,
    request_bytes: &[u8],
    head_request: bool,
) -> Result<Response, ForwardError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request_bytes).await?;
    stream.flush().await?;

    tracing::trace!("Request sent to backend");

    read_http_response(&mut stream, head_request).await
}

/// Read one complete response from `stream`.
///
/// Interim 1xx responses are skipped. The body is framed by, in order: the
/// request method and status (no body), chunked encoding, Content-Length,
/// or end of stream.
pub async fn read_http_response<S>(
    stream: &mut S,
    head_request: bool,
) -> Result<Response, ForwardError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    let head = loop {
        match parse_response_head(&buffer) {
            Ok((head, consumed)) => {
                buffer.advance(consumed);
                if head.status.is_informational()
                    && head.status != StatusCode::SWITCHING_PROTOCOLS
                {
                    continue;
                }
                break head;
            }
            Err(ParseError::Incomplete) => {
                if read_more(stream, &mut buffer).await? == 0 {
                    return Err(ForwardError::ClosedEarly);
                }
            }
            Err(e) => return Err(e.into()),
        }
    };

    let mut headers = head.headers.clone();
    strip_hop_by_hop(&mut headers);

    // A HEAD reply keeps the framing headers the backend chose, if any.
    if head_request {
        return Ok(Response {
            status: head.status,
            reason: Some(head.reason),
            headers,
            body: Vec::new(),
        });
    }

    let body = if head.status.forbids_body() {
        Vec::new()
    } else if head.is_chunked() {
        headers.remove("Content-Length");
        let mut decoder = ChunkedDecoder::new();
        loop {
            match decoder.decode(&buffer) {
                Ok(_) => break decoder.into_body(),
                Err(ParseError::Incomplete) => {
                    if read_more(stream, &mut buffer).await? == 0 {
                        return Err(ForwardError::ClosedEarly);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    } else if let Some(length) = head.content_length()? {
        while buffer.len() < length {
            if read_more(stream, &mut buffer).await? == 0 {
                return Err(ForwardError::ClosedEarly);
            }
        }
        buffer.split_to(length).to_vec()
    } else {
        // No framing: the body runs until the backend closes.
        while read_more(stream, &mut buffer).await? != 0 {}
        headers.remove("Content-Length");
        buffer.to_vec()
    };

    Ok(ResponseBuilder::new(head.status)
        .reason(head.reason)
        .headers(headers)
        .body(body)
        .build())
}

async fn read_more<S>(stream: &mut S, buffer: &mut BytesMut) -> std::io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    buffer.reserve(BUFFER_SIZE);
    match stream.read_buf(buffer).await {
        // TLS backends often close without close_notify.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
        other => other,
    }
}
