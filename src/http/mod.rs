//! HTTP/1.x protocol implementation.
//!
//! Just enough HTTP to accept requests from clients and relay them to a
//! backend over a fresh connection.
//!
//! # Architecture
//!
//! - **`connection`**: per-client request/response state machine
//! - **`headers`**: ordered, case-insensitive header list
//! - **`parser`**: request, response-head and chunked-body parsing
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: serializes and writes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request data
//!        └──────┬──────┘
//!               │ Request received (or 400 for a malformed one)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Select a backend and forward
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response to client
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close → Closed
//! ```

pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
