//! Test helpers: a throwaway loopback HTTP server with canned responses and
//! an in-memory directory keyed by endpoint.
//!
//! Each canned response answers exactly one connection, in order. Requests are
//! recorded so tests can assert on method, path, headers and body.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;
use std::thread;

use crate::error::ApiError;
use crate::graph::DirectoryApi;

/// A response the mock server sends back.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: Option<&'static str>,
    pub body: String,
}

impl CannedResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            reason: reason_for(status),
            content_type: Some("application/json; odata.metadata=minimal"),
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            reason: reason_for(status),
            content_type: Some("text/plain"),
            body: body.to_string(),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 202,
            reason: "Accepted",
            content_type: None,
            body: String::new(),
        }
    }
}

fn reason_for(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

/// A request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Loopback server answering a fixed sequence of requests.
pub struct MockServer {
    pub base_url: String,
    handle: thread::JoinHandle<Vec<RecordedRequest>>,
}

impl MockServer {
    pub fn start(responses: Vec<CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let handle = thread::spawn(move || {
            let mut recorded = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                recorded.push(read_request(&mut stream));
                write_response(&mut stream, &response);
            }
            recorded
        });

        Self { base_url, handle }
    }

    /// Wait for every canned response to be served and return the requests.
    pub fn finish(self) -> Vec<RecordedRequest> {
        self.handle.join().unwrap()
    }
}

fn read_request(stream: &mut TcpStream) -> RecordedRequest {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while raw.len() < header_end + content_length {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }

    let body = String::from_utf8_lossy(&raw[header_end..]).to_string();

    RecordedRequest {
        method,
        path,
        headers,
        body,
    }
}

fn write_response(stream: &mut TcpStream, response: &CannedResponse) {
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, response.reason);
    if let Some(content_type) = response.content_type {
        head.push_str(&format!("Content-Type: {}\r\n", content_type));
    }
    head.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        response.body.len()
    ));

    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(response.body.as_bytes());
    let _ = stream.flush();
}

/// In-memory [`DirectoryApi`] answering by exact endpoint.
///
/// Unknown endpoints answer 404 so a test fails loudly on an unexpected call.
#[derive(Default)]
pub struct FakeDirectory {
    responses: HashMap<String, Result<Value, u16>>,
    calls: Mutex<Vec<(Method, String, Option<Value>)>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, endpoint: &str, body: Value) -> Self {
        self.responses.insert(endpoint.to_string(), Ok(body));
        self
    }

    pub fn failing(mut self, endpoint: &str, status: u16) -> Self {
        self.responses.insert(endpoint.to_string(), Err(status));
        self
    }

    pub fn calls(&self) -> Vec<(Method, String, Option<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, e, _)| e).collect()
    }
}

#[async_trait]
impl DirectoryApi for FakeDirectory {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push((method, endpoint.to_string(), body));

        match self.responses.get(endpoint) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(status)) => Err(ApiError::Http {
                status: *status,
                reason: reason_for(*status).to_string(),
                body: String::new(),
            }),
            None => Err(ApiError::Http {
                status: 404,
                reason: "Not Found".to_string(),
                body: format!("no canned response for {}", endpoint),
            }),
        }
    }
}
