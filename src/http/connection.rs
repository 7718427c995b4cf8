use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::proxy::balancer::LoadBalancer;

const READ_CHUNK: usize = 8192;

/// One client connection, driven through its request/response cycle.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buffer: Vec<u8>,
    balancer: Arc<LoadBalancer>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

enum ReadOutcome {
    Request(Request),
    Malformed(ParseError),
    Eof,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, balancer: Arc<LoadBalancer>) -> Self {
        Self {
            stream,
            peer,
            buffer: Vec::with_capacity(4096),
            balancer,
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::Reading => match self.read_request().await? {
                    ReadOutcome::Request(req) => ConnectionState::Processing(req),
                    ReadOutcome::Malformed(e) => {
                        tracing::warn!(peer = %self.peer, error = %e, "Rejecting malformed request");
                        let mut response = Response::bad_request();
                        response.headers.insert("Connection", "close");
                        ConnectionState::Writing(ResponseWriter::new(&response), false)
                    }
                    ReadOutcome::Eof => ConnectionState::Closed,
                },

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let mut response = self.balancer.handle(&req, Some(self.peer)).await;
                    if !keep_alive {
                        response.headers.insert("Connection", "close");
                    }

                    let writer = if req.method == Method::HEAD {
                        ResponseWriter::head_only(&response)
                    } else {
                        ResponseWriter::new(&response)
                    };
                    ConnectionState::Writing(writer, keep_alive)
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    async fn read_request(&mut self) -> anyhow::Result<ReadOutcome> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(ReadOutcome::Request(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => return Ok(ReadOutcome::Malformed(e)),
            }

            let mut temp = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                if !self.buffer.is_empty() {
                    tracing::debug!(peer = %self.peer, "Client closed connection mid-request");
                }
                return Ok(ReadOutcome::Eof);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }
}
