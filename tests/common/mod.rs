use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use matchday_tv::config::FetchConfig;

/// A local HTTP server answering fixed paths with canned JSON. Paths not in
/// the table get a 404.
pub struct StubProvider {
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubProvider {
    pub fn start(routes: Vec<(String, u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub provider");
        let addr = listener.local_addr().expect("stub address");
        let routes: HashMap<String, (u16, String)> = routes
            .into_iter()
            .map(|(path, status, body)| (path, (status, body)))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else {
                    continue;
                };
                let Ok(read_half) = stream.try_clone() else {
                    continue;
                };
                let mut reader = BufReader::new(read_half);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header == "\r\n" => break,
                        Ok(_) => {}
                    }
                }
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                seen.lock().expect("request log").push(path.clone());

                let (status, body) = routes
                    .get(&path)
                    .cloned()
                    .unwrap_or((404, "{}".to_string()));
                let reason = match status {
                    200 => "OK",
                    403 => "Forbidden",
                    429 => "Too Many Requests",
                    _ => "Not Found",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    /// Paths requested so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log").clone()
    }
}

pub fn route(path: &str, status: u16, body: &str) -> (String, u16, String) {
    (path.to_string(), status, body.to_string())
}

/// Defaults with the stub as provider and no pacing, so passes run fast.
pub fn fetch_config(api_base: &str, shard_dir: &Path, aux_dir: &Path) -> FetchConfig {
    let mut cfg = FetchConfig::from_lookup(|_| None).expect("defaults should load");
    cfg.api_base = api_base.to_string();
    cfg.shard_dir = shard_dir.to_path_buf();
    cfg.aux_dir = aux_dir.to_path_buf();
    cfg.request_delay = Duration::ZERO;
    cfg.day_delay = Duration::ZERO;
    cfg.timeout = Duration::from_secs(5);
    cfg
}
