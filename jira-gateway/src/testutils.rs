//! Local stand-in for the Jira REST API, used by the gateway tests.

use crate::config::{CacheConfig, Config, Listener, RetryConfig, UpstreamConfig};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, header};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

type MockBody = UnsyncBoxBody<Bytes, Infallible>;

static ENDLESS_CHUNK: [u8; 16 * 1024] = [7; 16 * 1024];

#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Text(String),
    Status(u16),
    Delay(Duration, Box<Reply>),
    /// `len` bytes where byte `i` is `i % 251`, sent in `chunk`-sized frames
    Stream { len: usize, chunk: usize },
    /// Never finishes; the sender fires once hyper drops the body
    Endless(Arc<Mutex<Option<oneshot::Sender<()>>>>),
}

#[derive(Default)]
struct State {
    issues: HashMap<String, VecDeque<Reply>>,
    attachments: HashMap<String, VecDeque<Reply>>,
    hits: HashMap<String, u32>,
    last_authorization: Option<String>,
}

impl State {
    /// Scripted replies are consumed in order; the last one repeats.
    fn next_reply(replies: Option<&mut VecDeque<Reply>>) -> Option<Reply> {
        let replies = replies?;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

pub struct MockJira {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl MockJira {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));

        let server_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);
                let state = server_state.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(state.clone(), req));
                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockJira { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_issue(&self, key: &str, reply: Reply) {
        self.set_issue_sequence(key, vec![reply]);
    }

    pub fn set_issue_sequence(&self, key: &str, replies: Vec<Reply>) {
        let mut state = self.state.lock().unwrap();
        state.issues.insert(key.to_string(), replies.into());
    }

    pub fn set_attachment(&self, id: &str, reply: Reply) {
        let mut state = self.state.lock().unwrap();
        state.attachments.insert(id.to_string(), VecDeque::from([reply]));
    }

    /// Serves an attachment that never ends and returns a receiver that
    /// resolves once the mock stops sending it.
    pub fn set_endless_attachment(&self, id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.set_attachment(id, Reply::Endless(Arc::new(Mutex::new(Some(tx)))));
        rx
    }

    pub fn issue_hits(&self, key: &str) -> u32 {
        self.hits(&format!("issue:{key}"))
    }

    pub fn attachment_hits(&self, id: &str) -> u32 {
        self.hits(&format!("attachment:{id}"))
    }

    pub fn total_hits(&self) -> u32 {
        self.state.lock().unwrap().hits.values().sum()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.lock().unwrap().last_authorization.clone()
    }

    fn hits(&self, name: &str) -> u32 {
        let state = self.state.lock().unwrap();
        state.hits.get(name).copied().unwrap_or(0)
    }
}

async fn handle(
    state: Arc<Mutex<State>>,
    req: Request<Incoming>,
) -> Result<Response<MockBody>, Infallible> {
    let path = req.uri().path().to_string();

    let reply = {
        let mut state = state.lock().unwrap();
        state.last_authorization = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(key) = path.strip_prefix("/rest/api/3/issue/") {
            *state.hits.entry(format!("issue:{key}")).or_default() += 1;
            State::next_reply(state.issues.get_mut(key))
        } else if let Some(id) = path.strip_prefix("/rest/api/3/attachment/content/") {
            *state.hits.entry(format!("attachment:{id}")).or_default() += 1;
            State::next_reply(state.attachments.get_mut(id))
        } else {
            None
        }
    };

    let mut reply = reply.unwrap_or(Reply::Status(404));
    while let Reply::Delay(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }

    Ok(render(reply))
}

fn render(reply: Reply) -> Response<MockBody> {
    let builder = Response::builder();
    let response = match reply {
        Reply::Json(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(full(serde_json::to_vec(&value).unwrap())),
        Reply::Text(text) => builder
            .header(header::CONTENT_TYPE, "text/html")
            .body(full(text)),
        Reply::Status(code) => builder
            .status(StatusCode::from_u16(code).unwrap())
            .header(header::CONTENT_TYPE, "application/json")
            .body(full(r#"{"errorMessages":["scripted failure"]}"#)),
        Reply::Stream { len, chunk } => {
            let frames = stream::iter((0..len).step_by(chunk)).map(move |start| {
                let end = (start + chunk).min(len);
                let data: Vec<u8> = (start..end).map(|i| (i % 251) as u8).collect();
                Ok::<_, Infallible>(Frame::data(Bytes::from(data)))
            });
            builder
                .header(header::CONTENT_LENGTH, len)
                .body(StreamBody::new(frames).boxed_unsync())
        }
        Reply::Endless(signal) => {
            let guard = DropSignal(signal.lock().unwrap().take());
            let frames = stream::repeat_with(|| {
                Ok::<_, Infallible>(Frame::data(Bytes::from_static(&ENDLESS_CHUNK)))
            })
            .map(move |frame| {
                let _alive = &guard;
                frame
            });
            builder.body(StreamBody::new(frames).boxed_unsync())
        }
        Reply::Delay(..) => unreachable!("delays are resolved before rendering"),
    };
    response.unwrap()
}

fn full(data: impl Into<Bytes>) -> MockBody {
    Full::new(data.into()).boxed_unsync()
}

struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Gateway config pointed at `base_url`, with fast retries.
pub fn test_config(base_url: &str) -> Config {
    Config {
        listener: Listener::default(),
        upstream: UpstreamConfig {
            base_url: base_url.parse().unwrap(),
            email: "bot@example.com".into(),
            api_token: "secret-token".into(),
            connect_timeout_secs: 1.0,
            read_timeout_secs: 2.0,
        },
        retry: RetryConfig {
            max_attempts: 3,
            backoff_secs: 0.01,
        },
        cache: CacheConfig {
            enabled: true,
            ttl_secs: 180,
            max_capacity: 100,
        },
    }
}

pub fn issue_payload(key: &str) -> Value {
    json!({
        "id": "10000",
        "key": key,
        "fields": {
            "summary": format!("Summary of {key}"),
            "description": {
                "type": "doc",
                "version": 1,
                "content": [{"type": "paragraph", "content": [{"type": "text", "text": "Steps to reproduce"}]}]
            },
            "status": {"name": "Open"},
            "issuetype": {"name": "Bug"},
            "priority": {"name": "Medium"},
            "assignee": {"displayName": "Dana"},
            "reporter": null,
            "created": "2024-03-01T09:00:00.000+0000",
            "updated": "2024-03-02T09:00:00.000+0000",
            "comment": {"comments": []},
            "attachment": []
        },
        "renderedFields": {},
        "changelog": {"histories": []}
    })
}

pub fn issue_with_attachment(key: &str, attachment_id: &str, base_url: &str) -> Value {
    let mut payload = issue_payload(key);
    payload["fields"]["attachment"] = json!([{
        "id": attachment_id,
        "filename": format!("file-{attachment_id}.bin"),
        "size": 0,
        "content": format!("{base_url}/rest/api/3/attachment/content/{attachment_id}")
    }]);
    payload
}
