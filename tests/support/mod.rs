//! In-process stand-in for a Vault server.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

struct State {
    init_status: u16,
    post_status: u16,
    /// 1-based ordinal of the POST to reject with 500.
    fail_post: Option<usize>,
    posts: AtomicUsize,
    requests: Mutex<Vec<Request>>,
}

pub struct StubVault {
    port: u16,
    state: Arc<State>,
}

impl StubVault {
    pub fn ready() -> Self {
        Self::start(200, 200, None)
    }

    pub fn start(init_status: u16, post_status: u16, fail_post: Option<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(State {
            init_status,
            post_status,
            fail_post,
            posts: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });

        Self { port, state }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// KV engine base URL, e.g. `http://127.0.0.1:1234/v1/secret`.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/v1/secret", self.port)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .collect()
    }
}

fn handle(stream: TcpStream, state: &State) {
    let Some(request) = read_request(&stream) else {
        return;
    };

    let status = if request.method == "GET" && request.path == "/v1/sys/init" {
        state.init_status
    } else if request.method == "POST" {
        let n = state.posts.fetch_add(1, Ordering::SeqCst) + 1;
        if state.fail_post == Some(n) {
            500
        } else {
            state.post_status
        }
    } else {
        404
    };

    state.requests.lock().unwrap().push(request);

    let mut stream = stream;
    let response = format!("HTTP/1.1 {status} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn read_request(stream: &TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_owned();
    let path = parts.next()?.to_owned();

    let mut headers = Vec::new();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(':')?;
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_owned();
        if name == "content-length" {
            content_length = value.parse().ok()?;
        }
        headers.push((name, value));
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;

    Some(Request {
        method,
        path,
        headers,
        body: String::from_utf8(body).ok()?,
    })
}
