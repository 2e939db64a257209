//! Minimal HTTP/1.1 tile server for integration tests.
//!
//! Answers `GET /{z}/{x}/{y}.png` with a small body derived from the
//! coordinate, so a downloaded tile can be checked byte for byte.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy, Default)]
pub struct TileServerOptions {
    /// If set, every request is answered with this status and no body.
    pub status_override: Option<u16>,
}

pub struct TileServer {
    /// Base URL ending in `/`, e.g. "http://127.0.0.1:12345/".
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl TileServer {
    pub fn template(&self) -> String {
        format!("{}{{z}}/{{x}}/{{y}}.png", self.base_url)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Body served for tile `z/x/y`.
pub fn tile_body(z: u8, x: u32, y: u32) -> Vec<u8> {
    format!("PNG tile {}/{}/{}", z, x, y).into_bytes()
}

pub fn start() -> TileServer {
    start_with_options(TileServerOptions::default())
}

/// Starts a server in a background thread. It runs until the process exits.
pub fn start_with_options(opts: TileServerOptions) -> TileServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                handle(stream, opts)
            });
        }
    });
    TileServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        hits,
    }
}

fn handle(mut stream: std::net::TcpStream, opts: TileServerOptions) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };

    if let Some(status) = opts.status_override {
        let response = format!(
            "HTTP/1.1 {} Refused\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let body = match parse_tile_path(request) {
        Some((z, x, y)) => tile_body(z, x, y),
        None => {
            let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            return;
        }
    };
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
}

/// Parses `GET /z/x/y.png HTTP/1.1` into tile coordinates.
fn parse_tile_path(request: &str) -> Option<(u8, u32, u32)> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.eq_ignore_ascii_case("GET") {
        return None;
    }
    let path = parts.next()?.trim_start_matches('/');
    let mut segs = path.split('/');
    let z = segs.next()?.parse().ok()?;
    let x = segs.next()?.parse().ok()?;
    let y = segs.next()?.strip_suffix(".png")?.parse().ok()?;
    Some((z, x, y))
}
