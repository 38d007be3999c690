//! Mock dashboard API served by tiny_http

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

/// One request as seen by the mock
#[derive(Debug, Clone)]
pub struct Recorded {
    pub url: String,
    pub cookie: Option<String>,
}

/// How the mock answers a request
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

pub struct MockGrafana {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockGrafana {
    /// Serve on an ephemeral port. Each request is answered on its own thread
    /// so delayed replies do not hold up others.
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let seen = requests.clone();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let cookie = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Cookie"))
                    .map(|h| h.value.as_str().to_string());
                let url = request.url().to_string();
                seen.lock().unwrap().push(Recorded {
                    url: url.clone(),
                    cookie,
                });

                let handler = handler.clone();
                std::thread::spawn(move || {
                    let reply = handler(&url);
                    if !reply.delay.is_zero() {
                        std::thread::sleep(reply.delay);
                    }
                    let resp = Response::from_data(reply.body)
                        .with_status_code(reply.status)
                        .with_header("Content-Type: image/png".parse::<Header>().unwrap());
                    let _ = request.respond(resp);
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }
}

/// Value of query parameter `key` in a request URL
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let parsed = url::Url::parse(&format!("http://mock{}", url)).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub const DASHBOARD_JSON: &str = r#"{
    "dashboard": {
        "title": "Ops Overview",
        "panels": [
            {"type": "singlestat", "id": 1, "title": "Uptime"},
            {"type": "graph", "id": 2, "title": "CPU", "gridPos": {"h": 8, "w": 12, "x": 0, "y": 0}},
            {"type": "row", "id": 3, "title": "Details"},
            {"type": "text", "id": 4, "title": "Notes"}
        ]
    },
    "meta": {"slug": "ops-overview"}
}"#;
