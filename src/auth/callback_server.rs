//! Local HTTP callback server for OAuth authentication.
//!
//! Provides a temporary loopback server on the redirect URI's port to receive
//! the OAuth redirect, show the operator a short result page, and pass the
//! callback URL back to the token provider.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::CallbackTarget;

/// Result from the callback server.
#[derive(Debug, PartialEq, Eq)]
pub enum CallbackResult {
    /// Successfully received callback with the full URL.
    Success(String),
    /// Server was cancelled.
    Cancelled,
    /// Error occurred.
    Error(String),
}

/// Start the callback server and wait for a single OAuth callback.
///
/// Returns the full callback URL (including query parameters) when received.
/// The server shuts down after the callback or when `cancel_rx` fires or
/// disconnects.
pub fn start_callback_server(
    target: &CallbackTarget,
    cancel_rx: mpsc::Receiver<()>,
) -> CallbackResult {
    let addr = format!("127.0.0.1:{}", target.port);

    let listener = match TcpListener::bind(&addr) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind callback server to {}: {}", addr, e);
            return CallbackResult::Error(format!("Failed to start server: {}", e));
        }
    };

    info!("OAuth callback server listening on {}", addr);
    serve(listener, target, cancel_rx)
}

/// Accept connections on `listener` until a valid callback arrives.
fn serve(
    listener: TcpListener,
    target: &CallbackTarget,
    cancel_rx: mpsc::Receiver<()>,
) -> CallbackResult {
    // Non-blocking so cancellation is noticed between connections
    if let Err(e) = listener.set_nonblocking(true) {
        error!("Failed to set non-blocking mode: {}", e);
        return CallbackResult::Error(format!("Server configuration error: {}", e));
    }

    loop {
        match cancel_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                info!("Callback server cancelled");
                return CallbackResult::Cancelled;
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match listener.accept() {
            Ok((stream, peer_addr)) => {
                debug!("Connection from {}", peer_addr);
                if let Some(url) = handle_connection(stream, target) {
                    info!("OAuth callback received");
                    return CallbackResult::Success(url);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                return CallbackResult::Error(format!("Connection error: {}", e));
            }
        }
    }
}

/// Handle an incoming HTTP connection.
///
/// Returns Some(url) if this was an OAuth callback (success or error), None otherwise.
fn handle_connection(mut stream: TcpStream, target: &CallbackTarget) -> Option<String> {
    // Accepted sockets may inherit non-blocking mode from the listener
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));

    let mut buffer = [0; 4096];
    let bytes_read = match stream.read(&mut buffer) {
        Ok(n) => n,
        Err(e) => {
            debug!("Failed to read request: {}", e);
            return None;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..bytes_read]);
    let request_line = request.lines().next()?;
    debug!("Received request: {}", request_line);

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_response(&mut stream, 400, "Bad Request", "text/plain", "Bad Request");
        return None;
    }

    let (method, path) = (parts[0], parts[1]);

    if method != "GET" {
        send_response(
            &mut stream,
            405,
            "Method Not Allowed",
            "text/plain",
            "Method Not Allowed",
        );
        return None;
    }

    let (route, query) = path.split_once('?').unwrap_or((path, ""));
    if route != target.path {
        send_response(&mut stream, 404, "Not Found", "text/plain", "Not Found");
        return None;
    }

    let callback_url = format!("http://localhost:{}{}", target.port, path);

    if query.contains("error=") {
        send_result_page(&mut stream, false, &error_description(query));
        // The token provider turns this into an AuthError
        return Some(callback_url);
    }

    if !query.contains("code=") {
        send_response(
            &mut stream,
            400,
            "Bad Request",
            "text/plain",
            "Missing authorization code",
        );
        return None;
    }

    send_result_page(
        &mut stream,
        true,
        "You are signed in to the M365 User Management Tool.",
    );
    Some(callback_url)
}

/// Extract and decode `error_description` from a query string.
fn error_description(query: &str) -> String {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("error_description="))
        .and_then(|raw| urlencoding::decode(&raw.replace('+', " ")).ok().map(|s| s.into_owned()))
        .unwrap_or_else(|| "Authentication was cancelled or failed.".to_string())
}

/// Send the page the operator sees in the browser after the redirect.
fn send_result_page(stream: &mut TcpStream, success: bool, message: &str) {
    let (title, color) = if success {
        ("Authentication Successful", "#10B981")
    } else {
        ("Authentication Failed", "#EF4444")
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; display: flex;
               align-items: center; justify-content: center; min-height: 100vh; margin: 0; }}
        h1 {{ color: {color}; font-size: 1.5rem; }}
        p {{ color: #6B7280; }}
    </style>
</head>
<body>
    <div>
        <h1>{title}</h1>
        <p>{message}</p>
        <p>You can close this tab and return to the terminal.</p>
    </div>
</body>
</html>"#,
        title = title,
        color = color,
        message = crate::present::html::escape(message),
    );

    send_response(stream, 200, "OK", "text/html; charset=utf-8", &html);
}

fn send_response(stream: &mut TcpStream, status: u16, reason: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        content_type,
        body.len(),
        body
    );

    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
