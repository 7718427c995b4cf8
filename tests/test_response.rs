use turnstile::http::response::{Response, ResponseBuilder, StatusCode};
use turnstile::http::writer::ResponseWriter;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::NO_CONTENT.as_u16(), 204);
    assert_eq!(StatusCode::BAD_REQUEST.as_u16(), 400);
    assert_eq!(StatusCode::BAD_GATEWAY.as_u16(), 502);
    assert_eq!(StatusCode::GATEWAY_TIMEOUT.as_u16(), 504);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), "Not Found");
    assert_eq!(StatusCode::BAD_GATEWAY.reason_phrase(), "Bad Gateway");
    assert_eq!(StatusCode::from_u16(299).unwrap().reason_phrase(), "");
}

#[test]
fn test_status_code_range() {
    assert!(StatusCode::from_u16(99).is_none());
    assert!(StatusCode::from_u16(1000).is_none());
    assert!(StatusCode::from_u16(100).unwrap().forbids_body());
    assert!(StatusCode::NOT_MODIFIED.forbids_body());
    assert!(!StatusCode::OK.forbids_body());
}

#[test]
fn test_response_builder_with_headers() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .header("X-Custom", "value")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.get("Content-Type").unwrap(), "text/plain");
    assert_eq!(response.headers.get("X-Custom").unwrap(), "value");
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::OK)
        .body(body.clone())
        .build();

    let content_length = response.headers.get("Content-Length").unwrap();
    assert_eq!(content_length, body.len().to_string());
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Length", "999")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.get("Content-Length").unwrap(), "999");
}

#[test]
fn test_response_builder_multiple_headers() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Cache-Control", "no-cache")
        .header("X-Frame-Options", "DENY")
        .body(b"{}".to_vec())
        .build();

    assert_eq!(response.headers.len(), 4); // 3 custom + 1 auto (Content-Length)
}

#[test]
fn test_response_text_helper() {
    let response = Response::text(StatusCode::BAD_GATEWAY, "upstream down");

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.body, b"upstream down");
    assert!(response.headers.get("Content-Type").unwrap().starts_with("text/plain"));
}

#[test]
fn test_response_bad_request_helper() {
    let response = Response::bad_request();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[test]
fn test_writer_serializes_status_line_headers_and_body() {
    let response = ResponseBuilder::new(StatusCode::from_u16(418).unwrap())
        .reason("I'm a teapot")
        .header("X-Pot", "yes")
        .body(b"short".to_vec())
        .build();

    let writer = ResponseWriter::new(&response);

    assert_eq!(
        writer.as_bytes(),
        b"HTTP/1.1 418 I'm a teapot\r\nX-Pot: yes\r\nContent-Length: 5\r\n\r\nshort"
    );
}

#[test]
fn test_writer_head_only_omits_body() {
    let response = Response::ok(b"hidden".to_vec());

    let writer = ResponseWriter::head_only(&response);

    assert_eq!(
        writer.as_bytes(),
        b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n"
    );
}

#[tokio::test]
async fn test_writer_writes_whole_buffer() {
    let response = Response::ok(b"hello".to_vec());
    let mut writer = ResponseWriter::new(&response);
    let mut sink: Vec<u8> = Vec::new();

    writer.write_to_stream(&mut sink).await.unwrap();

    assert_eq!(sink, writer.as_bytes());
}
