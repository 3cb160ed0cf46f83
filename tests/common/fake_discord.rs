//! A wiremock server speaking just enough of the Discord REST API
//!
//! Uploads are parsed out of the multipart body and stored by attachment
//! filename; attachment URLs point back at the same server under `/cdn/`.

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const CHANNEL_ID: &str = "424242";
pub const BOT_TOKEN: &str = "test-bot-token";
pub const USER_TOKEN: &str = "test-user-token";

#[derive(Default)]
struct State {
    blobs: HashMap<String, Bytes>,
    refresh_batches: Vec<usize>,
}

/// Running fake host plus what it has seen
pub struct FakeDiscord {
    pub server: MockServer,
    state: Arc<Mutex<State>>,
}

impl FakeDiscord {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(State::default()));
        let base = server.uri();

        Mock::given(method("POST"))
            .and(path(format!("/channels/{CHANNEL_ID}/messages")))
            .and(header("Authorization", format!("Bot {BOT_TOKEN}").as_str()))
            .respond_with(UploadResponder {
                state: state.clone(),
                base: base.clone(),
            })
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/attachments/refresh-urls"))
            .and(header("Authorization", USER_TOKEN))
            .respond_with(RefreshResponder {
                state: state.clone(),
            })
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex("^/cdn/.+"))
            .respond_with(FetchResponder {
                state: state.clone(),
            })
            .mount(&server)
            .await;

        Self { server, state }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn blob_count(&self) -> usize {
        self.state.lock().unwrap().blobs.len()
    }

    pub fn refresh_batches(&self) -> Vec<usize> {
        self.state.lock().unwrap().refresh_batches.clone()
    }
}

fn expiry_hex(hours: i64) -> String {
    format!("{:x}", (Utc::now() + chrono::Duration::hours(hours)).timestamp())
}

struct UploadResponder {
    state: Arc<Mutex<State>>,
    base: String,
}

impl Respond for UploadResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some((label, content)) = file_part(request) else {
            return ResponseTemplate::new(400).set_body_string("no file part");
        };

        let url = format!("{}/cdn/{}?ex={}&hm=first", self.base, label, expiry_hex(24));
        self.state
            .lock()
            .unwrap()
            .blobs
            .insert(label.clone(), Bytes::from(content));

        ResponseTemplate::new(200).set_body_json(json!({
            "id": "1",
            "channel_id": CHANNEL_ID,
            "attachments": [{ "id": "2", "filename": label, "url": url }],
        }))
    }
}

struct RefreshResponder {
    state: Arc<Mutex<State>>,
}

impl Respond for RefreshResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let urls: Vec<String> = body["attachment_urls"]
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|u| u.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if urls.len() > 50 {
            return ResponseTemplate::new(400).set_body_string("too many urls");
        }
        self.state.lock().unwrap().refresh_batches.push(urls.len());

        let refreshed: Vec<serde_json::Value> = urls
            .iter()
            .map(|original| {
                let bare = original.split('?').next().unwrap_or(original);
                json!({
                    "original": original,
                    "refreshed": format!("{bare}?ex={}&hm=fresh", expiry_hex(24)),
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({ "refreshed_urls": refreshed }))
    }
}

struct FetchResponder {
    state: Arc<Mutex<State>>,
}

impl Respond for FetchResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let label = request.url.path().trim_start_matches("/cdn/");
        match self.state.lock().unwrap().blobs.get(label) {
            Some(content) => ResponseTemplate::new(200).set_body_bytes(content.to_vec()),
            None => ResponseTemplate::new(404),
        }
    }
}

/// Attachment filename and content of the `file` part of a multipart body
fn file_part(request: &Request) -> Option<(String, Vec<u8>)> {
    let content_type = request.headers.get("content-type")?.to_str().ok()?;
    let boundary = content_type.split("boundary=").nth(1)?.trim_matches('"');
    let delimiter = format!("--{boundary}");

    split(&request.body, delimiter.as_bytes())
        .into_iter()
        .find_map(|part| {
            let header_end = find(part, b"\r\n\r\n")?;
            let headers = String::from_utf8_lossy(&part[..header_end]);
            if !headers.contains("name=\"file\"") {
                return None;
            }
            let filename = headers.split("filename=\"").nth(1)?.split('"').next()?;
            let content = &part[header_end + 4..];
            let content = content.strip_suffix(b"\r\n").unwrap_or(content);
            Some((filename.to_string(), content.to_vec()))
        })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split<'a>(mut body: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    while let Some(at) = find(body, delimiter) {
        if at > 0 {
            parts.push(&body[..at]);
        }
        body = &body[at + delimiter.len()..];
    }
    parts
}
