/*!
In-process stand-in for the gist API.

Speaks the same wire format as the real service for the two endpoints the
client uses, which makes it suitable for offline hosts and tests. Only the
most recent [`MAX_RECORDED_REQUESTS`] requests are kept for inspection.
*/

use super::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::error::RemoteError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Number of requests retained by [`MemoryTransport::requests`]
pub const MAX_RECORDED_REQUESTS: usize = 256;

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<String, Value>,
    next_id: u64,
    requests: VecDeque<HttpRequest>,
    request_count: usize,
    required_token: Option<String>,
    forced_status: Option<u16>,
}

/// [`HttpTransport`] that stores remote objects in memory
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every request whose token differs from `token` with 401
    pub fn requiring_token<S: Into<String>>(token: S) -> Self {
        let transport = Self::default();
        transport.lock().required_token = Some(token.into());
        transport
    }

    /// Answer every following request with `status` and an error body
    pub fn fail_with_status(&self, status: u16) {
        self.lock().forced_status = Some(status);
    }

    pub fn clear_failure(&self) {
        self.lock().forced_status = None;
    }

    /// Store an object with the given `files` mapping under `id`
    pub fn insert_object<S: Into<String>>(&self, id: S, files: Value) {
        self.lock().objects.insert(id.into(), files);
    }

    /// `files` mapping of a stored object
    pub fn object_files(&self, id: &str) -> Option<Value> {
        self.lock().objects.get(id).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Most recent requests, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.iter().cloned().collect()
    }

    /// Total number of requests seen, including those no longer retained
    pub fn request_count(&self) -> usize {
        self.lock().request_count
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn error_response(status: u16, message: &str) -> HttpResponse {
    HttpResponse::new(status, json!({ "message": message }).to_string())
}

#[async_trait]
impl HttpTransport for MemoryTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, RemoteError> {
        let mut state = self.lock();
        if state.requests.len() == MAX_RECORDED_REQUESTS {
            state.requests.pop_front();
        }
        state.requests.push_back(request.clone());
        state.request_count += 1;

        if let Some(status) = state.forced_status {
            return Ok(error_response(status, "Forced failure"));
        }
        if let Some(token) = &state.required_token {
            let expected = format!("token {token}");
            if request.header_value("Authorization") != Some(expected.as_str()) {
                return Ok(error_response(401, "Bad credentials"));
            }
        }

        let path = request
            .url
            .find("/gists")
            .map(|at| &request.url[at..])
            .unwrap_or("");

        match (request.method, path) {
            (Method::Post, "/gists") => {
                let body: Value = match request.body.as_deref().map(serde_json::from_str::<Value>) {
                    Some(Ok(body)) => body,
                    _ => return Ok(error_response(400, "Problems parsing JSON")),
                };
                let files = match body.get("files") {
                    Some(files) if files.is_object() => files.clone(),
                    _ => return Ok(error_response(422, "Validation Failed")),
                };
                state.next_id += 1;
                let id = format!("{:020x}", state.next_id);
                state.objects.insert(id.clone(), files);
                Ok(HttpResponse::new(201, json!({ "id": id }).to_string()))
            }
            (Method::Get, path) => match path.strip_prefix("/gists/") {
                Some(id) => match state.objects.get(id) {
                    Some(files) => Ok(HttpResponse::new(
                        200,
                        json!({ "id": id, "files": files }).to_string(),
                    )),
                    None => Ok(error_response(404, "Not Found")),
                },
                None => Ok(error_response(404, "Not Found")),
            },
            _ => Ok(error_response(404, "Not Found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_get() {
        let transport = MemoryTransport::new();
        let body = json!({ "files": { "a.json": { "content": "{}" } }, "public": false });
        let created = transport
            .send(HttpRequest::post("http://mem/gists", body.to_string()))
            .await
            .unwrap();
        assert_eq!(created.status, 201);

        let id = serde_json::from_str::<Value>(&created.body).unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let fetched = transport
            .send(HttpRequest::get(format!("http://mem/gists/{id}")))
            .await
            .unwrap();
        assert_eq!(fetched.status, 200);
        assert_eq!(transport.object_count(), 1);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_request_log_is_bounded() {
        let transport = MemoryTransport::new();
        for i in 0..MAX_RECORDED_REQUESTS + 5 {
            transport
                .send(HttpRequest::get(format!("http://mem/gists/{i}")))
                .await
                .unwrap();
        }

        let requests = transport.requests();
        assert_eq!(requests.len(), MAX_RECORDED_REQUESTS);
        assert_eq!(requests[0].url, "http://mem/gists/5");
        assert_eq!(transport.request_count(), MAX_RECORDED_REQUESTS + 5);
    }

    #[tokio::test]
    async fn test_unknown_object_is_404() {
        let transport = MemoryTransport::new();
        let response = transport
            .send(HttpRequest::get("http://mem/gists/nope"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_token_and_forced_failures() {
        let transport = MemoryTransport::requiring_token("good");
        let response = transport
            .send(HttpRequest::get("http://mem/gists/x").header("Authorization", "token bad"))
            .await
            .unwrap();
        assert_eq!(response.status, 401);

        transport.fail_with_status(503);
        let response = transport
            .send(HttpRequest::get("http://mem/gists/x").header("Authorization", "token good"))
            .await
            .unwrap();
        assert_eq!(response.status, 503);

        transport.clear_failure();
        let response = transport
            .send(HttpRequest::get("http://mem/gists/x").header("Authorization", "token good"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }
}
