use turnstile::http::parser::{
    MAX_HEAD_BYTES, ParseError, decode_chunked, parse_http_request, parse_response_head,
};
use turnstile::http::request::Method;
use turnstile::http::response::StatusCode;

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.path, "/api");
    assert_eq!(parsed.body, b"hello".to_vec());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_multiple_headers_keep_order() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    let names: Vec<&str> = parsed.headers.iter().map(|(k, _)| k).collect();
    assert_eq!(names, vec!["Host", "User-Agent", "Accept"]);
    assert_eq!(parsed.headers.get("user-agent").unwrap(), "test-client");
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.path, "/search?q=rust&page=2");
}

#[test]
fn test_parse_pipelined_requests() {
    let req = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";

    let (first, consumed) = parse_http_request(req).unwrap();
    let (second, _) = parse_http_request(&req[consumed..]).unwrap();

    assert_eq!(first.path, "/a");
    assert_eq!(second.path, "/b");
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::Incomplete);
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::Incomplete);
}

#[test]
fn test_parse_invalid_http_method() {
    let req = b"GE(T / HTTP/1.1\r\n\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::InvalidMethod);
}

#[test]
fn test_parse_extension_method() {
    let req = b"PROPFIND /dav HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::Extension("PROPFIND".to_string()));
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::InvalidHeader);
}

#[test]
fn test_parse_unsupported_version() {
    let req = b"GET / HTTP/2.0\r\n\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::InvalidVersion);
}

#[test]
fn test_parse_conflicting_content_length() {
    let req = b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\nabcd";
    assert_eq!(
        parse_http_request(req).unwrap_err(),
        ParseError::InvalidContentLength
    );
}

#[test]
fn test_parse_chunked_request_body() {
    let req = b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, b"hello world");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_chunked_request_incomplete() {
    let req = b"POST /upload HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::Incomplete);
}

#[test]
fn test_parse_unknown_transfer_encoding() {
    let req = b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n";
    assert_eq!(
        parse_http_request(req).unwrap_err(),
        ParseError::UnsupportedTransferEncoding
    );
}

#[test]
fn test_parse_request_with_binary_body() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, vec![0, 1, 2, 3]);
}

#[test]
fn test_parse_oversized_head() {
    let mut req = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
    req.extend(std::iter::repeat_n(b'a', MAX_HEAD_BYTES + 1));

    assert_eq!(parse_http_request(&req).unwrap_err(), ParseError::HeadTooLarge);
}

#[test]
fn test_parse_response_head() {
    let resp = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
    let (head, consumed) = parse_response_head(resp).unwrap();

    assert_eq!(head.status, StatusCode::NOT_FOUND);
    assert_eq!(head.reason, "Not Found");
    assert_eq!(head.content_length().unwrap(), Some(0));
    assert_eq!(consumed, resp.len());
}

#[test]
fn test_parse_response_head_without_reason() {
    let (head, _) = parse_response_head(b"HTTP/1.1 299\r\n\r\n").unwrap();

    assert_eq!(head.status.as_u16(), 299);
    assert_eq!(head.reason, "");
}

#[test]
fn test_parse_response_head_bad_status() {
    let resp = b"HTTP/1.1 2x0 OK\r\n\r\n";
    assert_eq!(parse_response_head(resp).unwrap_err(), ParseError::InvalidStatus);
}

#[test]
fn test_decode_chunked_rejects_bad_size() {
    assert_eq!(
        decode_chunked(b"zz\r\nhello\r\n0\r\n\r\n").unwrap_err(),
        ParseError::InvalidChunk
    );
}

#[test]
fn test_decode_chunked_rejects_missing_chunk_terminator() {
    assert_eq!(
        decode_chunked(b"3\r\nabcX\r\n0\r\n\r\n").unwrap_err(),
        ParseError::InvalidChunk
    );
}
