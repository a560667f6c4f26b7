//! The backend REST surface.
//!
//! [`Backend`] is the seam between the session and the network; the session
//! only ever talks to a `dyn Backend`.  [`RoomsClient`] is the HTTP
//! implementation used against a real server.

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, STREAM_OPENS};
use crate::sse::process_sse;
use crate::stream::DeltaStream;
use crate::types::{Message, PromptRequest, Room, RoomId, RoomTitle};

/// Default server address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";

/// Default per-request timeout.  Reply streams are exempt once connected.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The operations the session needs from the backend.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// `GET /rooms`, in backend (creation) order.
    async fn list_rooms(&self) -> Result<Vec<Room>>;

    /// `POST /rooms`.
    async fn create_room(&self, title: &str) -> Result<Room>;

    /// `PUT /rooms/{id}`.
    async fn rename_room(&self, id: &RoomId, title: &str) -> Result<()>;

    /// `DELETE /rooms/{id}`.
    async fn delete_room(&self, id: &RoomId) -> Result<()>;

    /// `GET /rooms/{id}/messages`.
    async fn messages(&self, id: &RoomId) -> Result<Vec<Message>>;

    /// `POST /rooms/{id}/messages`, persisting the user's turn.
    async fn post_message(&self, id: &RoomId, prompt: &str) -> Result<()>;

    /// `GET /rooms/{id}/messages-stream`, the reply to the latest user turn.
    async fn open_stream(&self, id: &RoomId) -> Result<DeltaStream>;
}

/// HTTP client for the rooms backend.
#[derive(Debug, Clone)]
pub struct RoomsClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl RoomsClient {
    /// Create a client for the default server address.
    pub fn new() -> Result<Self> {
        Self::with_options(None, None)
    }

    /// Create a client with custom settings.
    pub fn with_options(base_url: Option<&str>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = Url::parse(base_url.unwrap_or(DEFAULT_BASE_URL))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::url(
                format!("{base_url} cannot be used as a base URL"),
                None,
            ));
        }
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .default_headers(Self::default_headers())
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The server address requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Resolve path segments against the base URL, percent-encoding each.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::url(format!("{} cannot be a base", self.base_url), None))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        room: Option<&RoomId>,
    ) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let response = request.send().await.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            if e.is_timeout() {
                Error::timeout(
                    format!("Request timed out: {e}"),
                    Some(self.timeout.as_secs_f64()),
                )
            } else if e.is_connect() {
                Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
            } else {
                Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
            }
        })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response, room).await);
        }
        Ok(response)
    }

    async fn process_error_response(response: Response, room: Option<&RoomId>) -> Error {
        let status_code = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };
        error_for_status(status_code, &body, room)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })
    }
}

#[async_trait::async_trait]
impl Backend for RoomsClient {
    async fn list_rooms(&self) -> Result<Vec<Room>> {
        let url = self.endpoint(&["rooms"])?;
        let response = self
            .execute(self.client.get(url).timeout(self.timeout), None)
            .await?;
        Self::json(response).await
    }

    async fn create_room(&self, title: &str) -> Result<Room> {
        let url = self.endpoint(&["rooms"])?;
        let body = RoomTitle {
            title: title.to_string(),
        };
        let response = self
            .execute(
                self.client.post(url).json(&body).timeout(self.timeout),
                None,
            )
            .await?;
        Self::json(response).await
    }

    async fn rename_room(&self, id: &RoomId, title: &str) -> Result<()> {
        let url = self.endpoint(&["rooms", id.as_str()])?;
        let body = RoomTitle {
            title: title.to_string(),
        };
        self.execute(
            self.client.put(url).json(&body).timeout(self.timeout),
            Some(id),
        )
        .await?;
        Ok(())
    }

    async fn delete_room(&self, id: &RoomId) -> Result<()> {
        let url = self.endpoint(&["rooms", id.as_str()])?;
        self.execute(self.client.delete(url).timeout(self.timeout), Some(id))
            .await?;
        Ok(())
    }

    async fn messages(&self, id: &RoomId) -> Result<Vec<Message>> {
        let url = self.endpoint(&["rooms", id.as_str(), "messages"])?;
        let response = self
            .execute(self.client.get(url).timeout(self.timeout), Some(id))
            .await?;
        Self::json(response).await
    }

    async fn post_message(&self, id: &RoomId, prompt: &str) -> Result<()> {
        let url = self.endpoint(&["rooms", id.as_str(), "messages"])?;
        let body = PromptRequest {
            prompt: prompt.to_string(),
        };
        self.execute(
            self.client.post(url).json(&body).timeout(self.timeout),
            Some(id),
        )
        .await?;
        Ok(())
    }

    async fn open_stream(&self, id: &RoomId) -> Result<DeltaStream> {
        let url = self.endpoint(&["rooms", id.as_str(), "messages-stream"])?;
        let request = self
            .client
            .get(url)
            .header(header::ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let response = self.execute(request, Some(id)).await?;
        STREAM_OPENS.click();

        let bytes = response.bytes_stream().map(|result| {
            result.map_err(|e| {
                Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
            })
        });
        Ok(Box::pin(process_sse(bytes)))
    }
}

/// Map a non-success status and its body to an error.
///
/// The message is taken from a JSON `detail`, `error` or `message` field when
/// the body has one, and is the raw body otherwise.
pub fn error_for_status(status_code: u16, body: &str, room: Option<&RoomId>) -> Error {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
        message: Option<String>,
    }

    fn describe(value: serde_json::Value) -> String {
        match value {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        }
    }

    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| {
            parsed
                .detail
                .map(describe)
                .or_else(|| parsed.error.map(describe))
                .or(parsed.message)
        })
        .unwrap_or_else(|| body.trim().to_string());

    tracing::debug!(status_code, %message, "backend rejected request");
    match status_code {
        400 | 422 => Error::bad_request(message),
        404 => Error::not_found(message, room.map(|r| r.to_string())),
        408 => Error::timeout(message, None),
        500..=599 => Error::server(status_code, message),
        _ => Error::api(status_code, message),
    }
}
