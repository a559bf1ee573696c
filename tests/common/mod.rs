//! In-process HTTP/1 servers standing in for the key-value store.
//!
//! Two flavours:
//! - [`TestServer::scripted`] answers requests from a fixed list of canned
//!   responses; once the list is exhausted it behaves like an idle long poll.
//! - [`TestServer::store`] keeps real values and versions and implements the
//!   `?watch=` long poll on top of a revision counter.
//!
//! Every request is recorded for assertions.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// A request as seen by the test server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub if_none_match: Option<String>,
    pub body: Bytes,
}

/// One scripted response
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Bytes,
    pub delay: Duration,
}

impl Canned {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            etag: None,
            body: Bytes::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn ok(etag: &str, body: &'static str) -> Self {
        Self::status(200).etag(etag).body(body)
    }

    pub fn etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    pub fn body(mut self, body: &'static str) -> Self {
        self.body = Bytes::from_static(body.as_bytes());
        self
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Versioned in-memory values with change notification
struct Store {
    values: Mutex<HashMap<String, (Bytes, u64)>>,
    revision: watch::Sender<u64>,
}

impl Store {
    fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            values: Mutex::new(HashMap::new()),
            revision,
        }
    }

    fn lookup(&self, key: &str) -> (StatusCode, String, Bytes) {
        match self.values.lock().unwrap().get(key) {
            Some((value, rev)) => (StatusCode::OK, format!("\"r{}\"", rev), value.clone()),
            None => (StatusCode::NOT_FOUND, "\"r0\"".to_string(), Bytes::new()),
        }
    }

    fn put(&self, key: &str, value: Bytes) {
        let mut values = self.values.lock().unwrap();
        let rev = *self.revision.borrow() + 1;
        values.insert(key.to_string(), (value, rev));
        self.revision.send_replace(rev);
    }
}

enum Behavior {
    Scripted(Mutex<VecDeque<Canned>>),
    Store(Store),
}

struct State {
    behavior: Behavior,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A running test server
pub struct TestServer {
    pub endpoint: String,
    state: Arc<State>,
}

impl TestServer {
    pub async fn scripted(responses: Vec<Canned>) -> Self {
        Self::spawn(Behavior::Scripted(Mutex::new(responses.into()))).await
    }

    pub async fn store() -> Self {
        Self::spawn(Behavior::Store(Store::new())).await
    }

    async fn spawn(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(State {
            behavior,
            requests: Mutex::new(Vec::new()),
        });

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let state = server_state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(state.clone(), req));
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            endpoint: format!("http://{}", addr),
            state,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Write directly into the backing store (store servers only)
    pub fn set(&self, key: &str, value: &'static str) {
        match &self.state.behavior {
            Behavior::Store(store) => store.put(key, Bytes::from_static(value.as_bytes())),
            Behavior::Scripted(_) => panic!("set() needs a store server"),
        }
    }
}

/// Port on localhost that refuses connections
pub async fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn watch_hint(query: Option<&str>) -> Option<Duration> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("watch="))
        .and_then(|secs| secs.parse().ok())
        .map(Duration::from_secs)
}

fn respond(status: StatusCode, etag: Option<&str>, body: Bytes) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    if let Some(etag) = etag {
        builder = builder.header("etag", etag);
    }
    builder.body(Full::new(body)).unwrap()
}

async fn handle(
    state: Arc<State>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());
    let if_none_match = req
        .headers()
        .get("if-none-match")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let body = req.into_body().collect().await.unwrap().to_bytes();

    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        query: query.clone(),
        if_none_match: if_none_match.clone(),
        body: body.clone(),
    });

    let hint = watch_hint(query.as_deref());

    let response = match &state.behavior {
        Behavior::Scripted(script) => {
            let next = script.lock().unwrap().pop_front();
            match next {
                Some(canned) => {
                    tokio::time::sleep(canned.delay).await;
                    let status = StatusCode::from_u16(canned.status).unwrap();
                    respond(status, canned.etag.as_deref(), canned.body)
                }
                None => {
                    // nothing left to say: hold like an idle long poll
                    tokio::time::sleep(hint.unwrap_or(Duration::from_secs(60))).await;
                    respond(StatusCode::NOT_MODIFIED, if_none_match.as_deref(), Bytes::new())
                }
            }
        }
        Behavior::Store(store) => {
            let key = path
                .strip_prefix("/kv/")
                .map(|k| percent_decode_str(k).decode_utf8_lossy().to_string());
            match (method, key) {
                (Method::PUT, Some(key)) => {
                    store.put(&key, body);
                    respond(StatusCode::NO_CONTENT, None, Bytes::new())
                }
                (Method::GET, Some(key)) => {
                    store_get(store, &key, if_none_match.as_deref(), hint).await
                }
                _ => respond(StatusCode::BAD_REQUEST, None, Bytes::new()),
            }
        }
    };

    Ok(response)
}

async fn store_get(
    store: &Store,
    key: &str,
    if_none_match: Option<&str>,
    hint: Option<Duration>,
) -> Response<Full<Bytes>> {
    let deadline = hint.map(|h| tokio::time::Instant::now() + h);

    loop {
        let mut changes = store.revision.subscribe();
        let (status, etag, value) = store.lookup(key);

        if if_none_match != Some(etag.as_str()) {
            return respond(status, Some(&etag), value);
        }

        let Some(deadline) = deadline else {
            return respond(StatusCode::NOT_MODIFIED, Some(&etag), Bytes::new());
        };

        match tokio::time::timeout_at(deadline, changes.changed()).await {
            Ok(Ok(())) => continue,
            _ => return respond(StatusCode::NOT_MODIFIED, Some(&etag), Bytes::new()),
        }
    }
}
