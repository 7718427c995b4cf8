use crate::http::headers::Headers;
use crate::http::request::{Method, Request};
use crate::http::response::StatusCode;

/// Largest request or response head (start line plus headers) accepted.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed start line")]
    InvalidRequest,
    #[error("invalid method token")]
    InvalidMethod,
    #[error("unsupported HTTP version")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("unsupported Transfer-Encoding")]
    UnsupportedTransferEncoding,
    #[error("malformed chunked body")]
    InvalidChunk,
    #[error("invalid status code")]
    InvalidStatus,
    #[error("message head exceeds 64 KiB")]
    HeadTooLarge,
    #[error("incomplete message")]
    Incomplete,
}

/// Start line and headers of a backend response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: String,
    pub status: StatusCode,
    pub reason: String,
    pub headers: Headers,
}

impl ResponseHead {
    pub fn is_chunked(&self) -> bool {
        is_chunked(&self.headers)
    }

    pub fn content_length(&self) -> Result<Option<usize>, ParseError> {
        content_length(&self.headers)
    }
}

/// Parses one complete request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied, or
/// `ParseError::Incomplete` when more input is needed.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    // Stray CRLFs between pipelined requests are ignored.
    let skip = buf
        .chunks(2)
        .take_while(|pair| *pair == b"\r\n")
        .count()
        * 2;
    let buf = &buf[skip..];

    let headers_end = find_headers_end(buf)?;
    let headers_str =
        std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidRequest)?;
    let body_bytes = &buf[headers_end + 4..];

    let mut lines = headers_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split(' ');

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let path = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;
    if parts.next().is_some() || path.is_empty() {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;
    check_version(version)?;

    let headers = parse_headers(lines)?;

    // Body
    let (body, body_len) = if headers.contains("Transfer-Encoding") {
        if !is_chunked(&headers) {
            return Err(ParseError::UnsupportedTransferEncoding);
        }
        decode_chunked(body_bytes)?
    } else {
        let length = content_length(&headers)?.unwrap_or(0);
        if body_bytes.len() < length {
            return Err(ParseError::Incomplete);
        }
        (body_bytes[..length].to_vec(), length)
    };

    let request = Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
    };

    Ok((request, skip + headers_end + 4 + body_len))
}

/// Parses a response status line and headers from the front of `buf`.
///
/// The returned length covers the head including its terminating blank line.
pub fn parse_response_head(buf: &[u8]) -> Result<(ResponseHead, usize), ParseError> {
    let headers_end = find_headers_end(buf)?;
    let head_str =
        std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidRequest)?;

    let mut lines = head_str.split("\r\n");
    let status_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = status_line.splitn(3, ' ');

    let version = parts.next().ok_or(ParseError::InvalidRequest)?;
    check_version(version)?;

    let code = parts.next().ok_or(ParseError::InvalidStatus)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidStatus);
    }
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(StatusCode::from_u16)
        .ok_or(ParseError::InvalidStatus)?;
    let reason = parts.next().unwrap_or("").to_string();

    let headers = parse_headers(lines)?;

    Ok((
        ResponseHead {
            version: version.to_string(),
            status,
            reason,
            headers,
        },
        headers_end + 4,
    ))
}

/// Decodes a chunked body from the front of `buf`.
///
/// Returns the de-chunked payload and the number of encoded bytes consumed,
/// trailers included. Trailer fields are discarded.
pub fn decode_chunked(buf: &[u8]) -> Result<(Vec<u8>, usize), ParseError> {
    let mut decoder = ChunkedDecoder::new();
    let consumed = decoder.decode(buf)?;
    Ok((decoder.into_body(), consumed))
}

/// Resumable chunked-body decoder.
///
/// Call [`decode`](Self::decode) with the same growing buffer after every
/// read. Chunks already copied out are never looked at again.
#[derive(Debug, Default)]
pub struct ChunkedDecoder {
    body: Vec<u8>,
    /// Offset of the first byte not yet decoded
    pos: usize,
    in_trailers: bool,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue decoding `buf`, which must start with the bytes passed to
    /// earlier calls.
    ///
    /// Returns the number of encoded bytes consumed once the last chunk and
    /// trailers are complete, or `ParseError::Incomplete` when more input is
    /// needed.
    pub fn decode(&mut self, buf: &[u8]) -> Result<usize, ParseError> {
        loop {
            let rest = buf.get(self.pos..).ok_or(ParseError::InvalidChunk)?;
            let line_end = find_crlf(rest).ok_or(ParseError::Incomplete)? + self.pos;

            if self.in_trailers {
                let empty = line_end == self.pos;
                self.pos = line_end + 2;
                if empty {
                    return Ok(self.pos);
                }
                continue;
            }

            let size_line = std::str::from_utf8(&buf[self.pos..line_end])
                .map_err(|_| ParseError::InvalidChunk)?;
            let size_str = size_line.split(';').next().unwrap_or("").trim();
            let size =
                usize::from_str_radix(size_str, 16).map_err(|_| ParseError::InvalidChunk)?;
            let data_start = line_end + 2;

            if size == 0 {
                self.pos = data_start;
                self.in_trailers = true;
                continue;
            }

            let data_end = data_start.checked_add(size).ok_or(ParseError::InvalidChunk)?;
            if buf.len() < data_end.saturating_add(2) {
                return Err(ParseError::Incomplete);
            }
            if &buf[data_end..data_end + 2] != b"\r\n" {
                return Err(ParseError::InvalidChunk);
            }
            self.body.extend_from_slice(&buf[data_start..data_end]);
            self.pos = data_end + 2;
        }
    }

    /// Payload decoded so far.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// True if the final transfer coding is `chunked`.
pub fn is_chunked(headers: &Headers) -> bool {
    headers
        .get_all("Transfer-Encoding")
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .last()
        .is_some_and(|t| t.eq_ignore_ascii_case("chunked"))
}

/// Declared Content-Length; repeated headers must agree.
pub fn content_length(headers: &Headers) -> Result<Option<usize>, ParseError> {
    let mut length = None;
    for value in headers.get_all("Content-Length").flat_map(|v| v.split(',')) {
        let parsed = value
            .trim()
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength)?;
        match length {
            Some(existing) if existing != parsed => {
                return Err(ParseError::InvalidContentLength);
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        if key.is_empty() || key.bytes().any(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::InvalidHeader);
        }

        headers.append(key, value.trim());
    }

    Ok(headers)
}

fn check_version(version: &str) -> Result<(), ParseError> {
    match version {
        "HTTP/1.1" | "HTTP/1.0" => Ok(()),
        _ => Err(ParseError::InvalidVersion),
    }
}

fn find_headers_end(buf: &[u8]) -> Result<usize, ParseError> {
    match buf.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(end) if end > MAX_HEAD_BYTES => Err(ParseError::HeadTooLarge),
        Some(end) => Ok(end),
        None if buf.len() > MAX_HEAD_BYTES => Err(ParseError::HeadTooLarge),
        None => Err(ParseError::Incomplete),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn chunk_extensions_and_trailers_are_skipped() {
        let body = b"4;ext=1\r\nWiki\r\n0\r\nX-Checksum: abc\r\n\r\nNEXT";

        let (decoded, consumed) = decode_chunked(body).unwrap();

        assert_eq!(decoded, b"Wiki");
        assert_eq!(&body[consumed..], b"NEXT");
    }

    #[test]
    fn chunked_decoder_resumes_without_rereading() {
        let encoded = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let mut decoder = ChunkedDecoder::new();
        let mut buf = Vec::new();

        for (i, byte) in encoded.iter().enumerate() {
            buf.push(*byte);
            match decoder.decode(&buf) {
                Ok(consumed) => {
                    assert_eq!(i, encoded.len() - 1);
                    assert_eq!(consumed, encoded.len());
                }
                Err(ParseError::Incomplete) => {
                    // The first chunk is done once its CRLF arrives; scribbling
                    // over it must not matter afterwards.
                    if i == 9 {
                        buf[..10].fill(b'#');
                    }
                }
                Err(e) => panic!("unexpected error at byte {}: {}", i, e),
            }
        }

        assert_eq!(decoder.into_body(), b"hello world");
    }
}
