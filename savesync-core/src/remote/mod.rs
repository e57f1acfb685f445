/*!
Remote persistence client for the gist snippet-storage service.

Each save becomes one private gist holding a single JSON file. The client is
stateless: the auth token is passed on every call and nothing is cached or
retried.
*/

pub mod memory;
pub mod transport;

use crate::error::RemoteError;
use crate::record::{RemoteId, RemoteSaveRecord};
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::observability::MetricsTimer;

pub use memory::MemoryTransport;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method};
#[cfg(feature = "reqwest-transport")]
pub use transport::ReqwestTransport;

/// Default endpoint of the snippet-storage API
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Name of the file inside each remote object that holds the save record
pub const SAVE_FILE_NAME: &str = "gba_save.json";

#[derive(Serialize)]
struct CreateRequest<'a> {
    files: BTreeMap<&'a str, FileContent<'a>>,
    public: bool,
    description: String,
}

#[derive(Serialize)]
struct FileContent<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct CreatedObject {
    id: Option<String>,
}

#[derive(Deserialize)]
struct RemoteObject {
    #[serde(default)]
    files: HashMap<String, Option<RemoteFile>>,
}

#[derive(Deserialize)]
struct RemoteFile {
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    raw_url: Option<String>,
}

/// Check that `url` is an http(s) endpoint and strip trailing slashes
pub fn validate_base_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| {
            SyncError::validation(format!(
                "remote base URL must start with http:// or https://, got '{url}'"
            ))
        })?;
    if host.is_empty() {
        return Err(SyncError::validation("remote base URL has no host"));
    }
    Ok(trimmed.to_string())
}

/// `scheme://host[:port]` of `url`, lowercased
fn url_origin(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    // userinfo is not part of the host
    let host = authority.rsplit('@').next()?;
    if scheme.is_empty() || host.is_empty() {
        return None;
    }
    Some(format!(
        "{}://{}",
        scheme.to_ascii_lowercase(),
        host.to_ascii_lowercase()
    ))
}

fn validate_remote_id(id: &RemoteId) -> Result<()> {
    let valid = id
        .as_str()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SyncError::validation(format!(
            "remote id '{id}' contains characters not allowed in a path segment"
        )))
    }
}

/// Client for creating and fetching remote save objects
///
/// # Example
/// ```rust,no_run
/// use savesync_core::remote::{RemoteClient, ReqwestTransport};
/// use savesync_core::RemoteSaveRecord;
///
/// # async fn run() -> savesync_core::Result<()> {
/// let client = RemoteClient::new(ReqwestTransport::new()?);
/// let record = RemoteSaveRecord::new("POKEMON EMER", vec![0; 32], 2);
/// let id = client.create(&record, "ghp_token").await?;
/// let restored = client.fetch(&id, "ghp_token").await?;
/// assert_eq!(restored.data, record.data);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RemoteClient<T> {
    transport: T,
    base_url: String,
}

impl<T: HttpTransport> RemoteClient<T> {
    /// Create a client talking to [`DEFAULT_API_BASE`]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at another API endpoint
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = validate_base_url(base_url)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Store `record` as a new private remote object
    ///
    /// # Returns
    /// The identifier the backend assigned to the new object
    ///
    /// # Errors
    /// * `RemoteError::RequestFailed` - Non-success status (401/403 for a rejected token) or no response
    /// * `RemoteError::MalformedPayload` - The success body carries no `id`
    pub async fn create(&self, record: &RemoteSaveRecord, auth: &str) -> Result<RemoteId> {
        let content = record.to_json()?;
        let mut files = BTreeMap::new();
        files.insert(SAVE_FILE_NAME, FileContent { content: &content });
        let body = serde_json::to_string(&CreateRequest {
            files,
            public: false,
            description: record.description(),
        })?;

        info!(
            game = %record.game,
            size = record.data.len(),
            save_type = record.save_type,
            "Creating remote save"
        );

        let request = HttpRequest::post(format!("{}/gists", self.base_url), body)
            .header("Authorization", format!("token {auth}"))
            .header("Content-Type", "application/json");
        let response = self.send("create", request).await?;

        let created: CreatedObject = serde_json::from_str(&response.body)
            .map_err(|e| RemoteError::malformed(format!("invalid create response: {e}")))?;
        let id = created
            .id
            .and_then(RemoteId::new)
            .ok_or_else(|| RemoteError::malformed("create response has no id"))?;

        info!(game = %record.game, remote_id = %id, "Created remote save");
        Ok(id)
    }

    /// Retrieve the save record stored in the remote object `id`
    ///
    /// # Errors
    /// * `RemoteError::RequestFailed` - Non-success status or no response
    /// * `RemoteError::NotFound` - The object has no [`SAVE_FILE_NAME`] file
    /// * `RemoteError::MalformedPayload` - The file content is not a save record
    pub async fn fetch(&self, id: &RemoteId, auth: &str) -> Result<RemoteSaveRecord> {
        validate_remote_id(id)?;
        info!(remote_id = %id, "Fetching remote save");

        let request = HttpRequest::get(format!("{}/gists/{}", self.base_url, id))
            .header("Authorization", format!("token {auth}"));
        let response = self.send("fetch", request).await?;

        let object: RemoteObject = serde_json::from_str(&response.body)
            .map_err(|e| RemoteError::malformed(format!("invalid fetch response: {e}")))?;
        let file = object
            .files
            .get(SAVE_FILE_NAME)
            .and_then(Option::as_ref)
            .ok_or_else(|| RemoteError::NotFound {
                file: SAVE_FILE_NAME.to_string(),
            })?;

        let content = match (file.truncated, &file.raw_url, &file.content) {
            (true, Some(raw_url), _) => {
                debug!(remote_id = %id, raw_url = %raw_url, "Save file truncated, fetching raw content");
                let mut request = HttpRequest::get(raw_url.as_str());
                if self.shares_origin(raw_url) {
                    request = request.header("Authorization", format!("token {auth}"));
                } else {
                    debug!(remote_id = %id, "Raw content is on another host, omitting credentials");
                }
                self.send("fetch_raw", request).await?.body
            }
            (_, _, Some(content)) => content.clone(),
            (_, _, None) => {
                return Err(RemoteError::malformed("save file has no content").into());
            }
        };

        let record = RemoteSaveRecord::from_json(&content)?;
        debug!(
            remote_id = %id,
            game = %record.game,
            size = record.data.len(),
            "Fetched remote save"
        );
        Ok(record)
    }

    fn shares_origin(&self, url: &str) -> bool {
        match (url_origin(url), url_origin(&self.base_url)) {
            (Some(target), Some(base)) => target == base,
            _ => false,
        }
    }

    async fn send(&self, operation: &'static str, request: HttpRequest) -> Result<HttpResponse> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start(operation);

        let method = request.method;
        let url = request.url.clone();
        let outcome = self.transport.send(request).await.and_then(|response| {
            if response.is_success() {
                Ok(response)
            } else {
                Err(RemoteError::status(
                    response.status,
                    format!("{operation} rejected by remote"),
                ))
            }
        });

        match outcome {
            Ok(response) => {
                #[cfg(feature = "metrics")]
                timer.finish();
                debug!(operation, %method, url = %url, status = response.status, "Remote request succeeded");
                Ok(response)
            }
            Err(e) => {
                #[cfg(feature = "metrics")]
                timer.finish_with_error();
                if e.is_auth_rejected() {
                    warn!(operation, url = %url, error = %e, "Remote rejected the auth token");
                } else {
                    error!(operation, %method, url = %url, error = %e, "Remote request failed");
                }
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<std::result::Result<HttpResponse, RemoteError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn replying(responses: Vec<std::result::Result<HttpResponse, RemoteError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, RemoteError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request")
        }
    }

    fn gist_with_content(content: &str) -> String {
        serde_json::json!({
            "id": "abc123",
            "files": { SAVE_FILE_NAME: { "filename": SAVE_FILE_NAME, "content": content } }
        })
        .to_string()
    }

    fn sample_record() -> RemoteSaveRecord {
        RemoteSaveRecord::new("ZELDA", vec![1, 2, 3], 4)
    }

    fn id(raw: &str) -> RemoteId {
        RemoteId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_create_request_wire_format() {
        let transport = ScriptedTransport::replying(vec![Ok(HttpResponse::new(
            201,
            r#"{"id":"aa5a315d61ae9438b18d"}"#,
        ))]);
        let client = RemoteClient::new(transport);
        let record = sample_record();

        let remote_id = client.create(&record, "ghp_secret").await.unwrap();
        assert_eq!(remote_id.as_str(), "aa5a315d61ae9438b18d");

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://api.github.com/gists");
        assert_eq!(request.header_value("Authorization"), Some("token ghp_secret"));
        assert_eq!(request.header_value("Content-Type"), Some("application/json"));

        let body: serde_json::Value =
            serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["public"], false);
        assert_eq!(body["description"], "GBA Save: ZELDA");
        let content = body["files"][SAVE_FILE_NAME]["content"].as_str().unwrap();
        assert_eq!(RemoteSaveRecord::from_json(content).unwrap().data, record.data);
    }

    #[tokio::test]
    async fn test_create_body_key_order() {
        let transport =
            ScriptedTransport::replying(vec![Ok(HttpResponse::new(201, r#"{"id":"x1"}"#))]);
        let client = RemoteClient::new(transport);
        client.create(&sample_record(), "t").await.unwrap();

        let body = client.transport().requests()[0].body.clone().unwrap();
        let files = body.find("\"files\"").unwrap();
        let public = body.find("\"public\"").unwrap();
        let description = body.find("\"description\"").unwrap();
        assert!(files < public && public < description);
    }

    #[tokio::test]
    async fn test_create_non_success_status() {
        let transport = ScriptedTransport::replying(vec![Ok(HttpResponse::new(
            401,
            r#"{"message":"Bad credentials"}"#,
        ))]);
        let client = RemoteClient::new(transport);

        let err = client.create(&sample_record(), "bad").await.unwrap_err();
        let remote = err.as_remote().unwrap();
        assert_eq!(remote.http_status(), Some(401));
        assert!(remote.is_auth_rejected());
    }

    #[tokio::test]
    async fn test_create_response_without_id() {
        let transport = ScriptedTransport::replying(vec![Ok(HttpResponse::new(201, "{}"))]);
        let client = RemoteClient::new(transport);

        let err = client.create(&sample_record(), "t").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Remote(RemoteError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_parses_record() {
        let content = sample_record().to_json().unwrap();
        let transport =
            ScriptedTransport::replying(vec![Ok(HttpResponse::new(200, gist_with_content(&content)))]);
        let client = RemoteClient::new(transport)
            .with_base_url("http://localhost:8080/api/")
            .unwrap();

        let record = client.fetch(&id("abc123"), "ghp_secret").await.unwrap();
        assert_eq!(record.game, "ZELDA");
        assert_eq!(record.data, vec![1, 2, 3]);
        assert_eq!(record.save_type, 4);

        let request = &client.transport().requests()[0];
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.url, "http://localhost:8080/api/gists/abc123");
        assert_eq!(request.header_value("Authorization"), Some("token ghp_secret"));
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn test_fetch_http_404() {
        let transport = ScriptedTransport::replying(vec![Ok(HttpResponse::new(
            404,
            r#"{"message":"Not Found"}"#,
        ))]);
        let client = RemoteClient::new(transport);

        let err = client.fetch(&id("abc123"), "t").await.unwrap_err();
        assert_eq!(err.as_remote().and_then(RemoteError::http_status), Some(404));
    }

    #[tokio::test]
    async fn test_fetch_missing_save_file() {
        let body = serde_json::json!({
            "id": "abc123",
            "files": { "notes.txt": { "content": "hello" } }
        })
        .to_string();
        let transport = ScriptedTransport::replying(vec![Ok(HttpResponse::new(200, body))]);
        let client = RemoteClient::new(transport);

        let err = client.fetch(&id("abc123"), "t").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Remote(RemoteError::NotFound { ref file }) if file == SAVE_FILE_NAME
        ));
    }

    #[tokio::test]
    async fn test_fetch_malformed_content() {
        let transport = ScriptedTransport::replying(vec![Ok(HttpResponse::new(
            200,
            gist_with_content("{\"game\": 12}"),
        ))]);
        let client = RemoteClient::new(transport);

        let err = client.fetch(&id("abc123"), "t").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Remote(RemoteError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_follows_raw_url_when_truncated() {
        let content = sample_record().to_json().unwrap();
        let body = serde_json::json!({
            "id": "abc123",
            "files": { SAVE_FILE_NAME: {
                "content": &content[..10],
                "truncated": true,
                "raw_url": "https://gist.githubusercontent.com/u/abc123/raw/gba_save.json"
            } }
        })
        .to_string();
        let transport = ScriptedTransport::replying(vec![
            Ok(HttpResponse::new(200, body)),
            Ok(HttpResponse::new(200, content)),
        ]);
        let client = RemoteClient::new(transport);

        let record = client.fetch(&id("abc123"), "t").await.unwrap();
        assert_eq!(record.data, vec![1, 2, 3]);

        let requests = client.transport().requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].url.ends_with("/raw/gba_save.json"));
        assert_eq!(requests[1].header_value("Authorization"), None);
    }

    fn truncated_gist(raw_url: &str) -> String {
        serde_json::json!({
            "id": "abc123",
            "files": { SAVE_FILE_NAME: {
                "content": "{\"game\"",
                "truncated": true,
                "raw_url": raw_url
            } }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_raw_url_on_foreign_host_gets_no_token() {
        let content = sample_record().to_json().unwrap();
        for raw_url in [
            "https://attacker.example/steal",
            "https://api.github.com@attacker.example/steal",
            "http://api.github.com/gists/abc123/raw",
        ] {
            let transport = ScriptedTransport::replying(vec![
                Ok(HttpResponse::new(200, truncated_gist(raw_url))),
                Ok(HttpResponse::new(200, content.clone())),
            ]);
            let client = RemoteClient::new(transport);

            client.fetch(&id("abc123"), "ghp_SECRET").await.unwrap();

            let requests = client.transport().requests();
            assert_eq!(requests[0].header_value("Authorization"), Some("token ghp_SECRET"));
            assert_eq!(requests[1].url, raw_url);
            assert_eq!(requests[1].header_value("Authorization"), None);
        }
    }

    #[tokio::test]
    async fn test_raw_url_on_api_host_keeps_token() {
        let content = sample_record().to_json().unwrap();
        let transport = ScriptedTransport::replying(vec![
            Ok(HttpResponse::new(
                200,
                truncated_gist("http://LOCALHOST:8080/api/gists/abc123/raw"),
            )),
            Ok(HttpResponse::new(200, content)),
        ]);
        let client = RemoteClient::new(transport)
            .with_base_url("http://localhost:8080/api")
            .unwrap();

        client.fetch(&id("abc123"), "ghp_SECRET").await.unwrap();

        let requests = client.transport().requests();
        assert_eq!(requests[1].header_value("Authorization"), Some("token ghp_SECRET"));
    }

    #[test]
    fn test_url_origin() {
        assert_eq!(
            url_origin("https://API.github.com/gists/1").as_deref(),
            Some("https://api.github.com")
        );
        assert_eq!(
            url_origin("http://127.0.0.1:9000?x=1").as_deref(),
            Some("http://127.0.0.1:9000")
        );
        assert_eq!(
            url_origin("https://user@host.example/x").as_deref(),
            Some("https://host.example")
        );
        assert_eq!(url_origin("no-scheme/path"), None);
        assert_eq!(url_origin("https:///path"), None);
    }

    #[tokio::test]
    async fn test_transport_failure_is_request_failed() {
        let transport =
            ScriptedTransport::replying(vec![Err(RemoteError::transport("connection refused"))]);
        let client = RemoteClient::new(transport);

        let err = client.fetch(&id("abc123"), "t").await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Remote(RemoteError::RequestFailed { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_unsafe_id_without_io() {
        let client = RemoteClient::new(ScriptedTransport::default());

        let err = client.fetch(&id("../users"), "t").await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(client.transport().requests().is_empty());
    }

    #[test]
    fn test_validate_base_url() {
        assert_eq!(
            validate_base_url("https://api.github.com/").unwrap(),
            "https://api.github.com"
        );
        assert_eq!(
            validate_base_url("http://127.0.0.1:9000").unwrap(),
            "http://127.0.0.1:9000"
        );
        assert!(validate_base_url("ftp://example.com").is_err());
        assert!(validate_base_url("api.github.com").is_err());
        assert!(validate_base_url("https://").is_err());
        assert!(validate_base_url("http://").is_err());
    }
}
