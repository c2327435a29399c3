//! Intercom API client.
//!
//! Issues authenticated requests, classifies responses, and drives the
//! retry policy. Retries are invisible to callers except as latency: each
//! requested id resolves to one success or one terminal error. Batch
//! fetches are fail-fast: the first failed id aborts the remaining work.
//!
//! The wire layer sits behind the [`Transport`] trait so the fallback,
//! batching, and deadline logic can be exercised without a network.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::RequestBuilder;
use serde_json::{json, Value};

use crate::application::retry::{
    run_with_retry, Classification, ClassifiedError, RetryPolicy, Sleeper, TokioSleeper,
};
use crate::domain::models::field_as_id;
use crate::domain::{AppError, Config, Conversation, IntercomConfig, Result};

const INTERCOM_VERSION_HEADER: HeaderName = HeaderName::from_static("intercom-version");

/// Maximum number of response-body characters carried in error messages.
const BODY_EXCERPT_LEN: usize = 200;

/// One classified exchange with the API: send a request, return the parsed
/// body or the classified failure.
pub trait Transport: Send + Sync {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> impl Future<Output = std::result::Result<Value, ClassifiedError>> + Send;

    fn get_json(
        &self,
        url: &str,
    ) -> impl Future<Output = std::result::Result<Value, ClassifiedError>> + Send;
}

/// Production transport backed by `reqwest`.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport with default headers from the API settings.
    ///
    /// # Errors
    /// Returns a configuration error when the token or version cannot form
    /// a valid header value.
    pub fn new(intercom: &IntercomConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", intercom.api_token))
            .map_err(|_| AppError::Config {
                message: "intercom.api_token contains characters invalid in a header".to_string(),
            })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let version = HeaderValue::from_str(&intercom.api_version).map_err(|_| {
            AppError::Config {
                message: "intercom.api_version contains characters invalid in a header"
                    .to_string(),
            }
        })?;
        headers.insert(INTERCOM_VERSION_HEADER, version);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(AppError::http)?;

        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> impl Future<Output = std::result::Result<Value, ClassifiedError>> + Send {
        let request = self.http.post(url).json(body);
        async move { dispatch(request).await }
    }

    fn get_json(
        &self,
        url: &str,
    ) -> impl Future<Output = std::result::Result<Value, ClassifiedError>> + Send {
        let request = self.http.get(url);
        async move { dispatch(request).await }
    }
}

/// Client for the Intercom conversations API.
pub struct ApiClient<T: Transport = HttpTransport, S: Sleeper = TokioSleeper> {
    transport: T,
    config: Config,
    policy: RetryPolicy,
    sleeper: S,
    deadline: Option<Duration>,
}

impl ApiClient {
    /// Build a client from resolved configuration.
    ///
    /// # Errors
    /// Returns a configuration error when the API token cannot form a valid
    /// `Authorization` header.
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.intercom)?;
        Ok(Self::with_parts(config, transport, TokioSleeper))
    }
}

impl<T: Transport, S: Sleeper> ApiClient<T, S> {
    /// Assemble a client from explicit parts. Tests supply a stub transport
    /// and an instant sleeper here.
    pub fn with_parts(config: Config, transport: T, sleeper: S) -> Self {
        let policy = RetryPolicy::new(&config.retry);
        Self {
            transport,
            config,
            policy,
            sleeper,
            deadline: None,
        }
    }

    /// Bound the whole of the next batch fetch by a run deadline. Expiry
    /// cancels in-flight requests and backoff sleeps.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fetch a single conversation by id.
    ///
    /// The search endpoint sometimes returns a record without its opening
    /// message; in that case the detailed record is fetched with a direct
    /// GET.
    ///
    /// # Errors
    /// Returns a not-found error when the id yields no record, or the
    /// terminal fetch/parsing error otherwise.
    pub async fn fetch_conversation(&self, id: &str) -> Result<Conversation> {
        let wanted = [id.to_string()];
        let hits = self
            .search_raw(&search_payload(ids_query(&wanted)))
            .await
            .map_err(|e| e.for_id(id))?;

        let hit = hits
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound { id: id.to_string() })?;

        let payload = if hit_is_complete(&hit) {
            hit
        } else {
            tracing::debug!(conversation = id, "Search result incomplete, fetching detail");
            self.fetch_detail(id).await.map_err(|e| e.for_id(id))?
        };

        Conversation::from_api_payload(&payload).map_err(|e| e.for_id(id))
    }

    /// Fetch many conversations, batched per `export.batch_size`.
    ///
    /// Results come back in input-id order regardless of the order the API
    /// returns them. Fail-fast: the first batch error, or the first
    /// requested id absent from its batch response, aborts the run naming
    /// that id. When a deadline is configured, expiry aborts in-flight and
    /// pending batches with a cancellation error carrying the records
    /// fetched so far.
    ///
    /// # Errors
    /// Returns the first terminal per-batch or per-id error.
    pub async fn fetch_conversations(&self, ids: &[String]) -> Result<Vec<Conversation>> {
        let deadline = self.deadline.map(|d| tokio::time::Instant::now() + d);
        let total = ids.len();
        let batch_size = self.config.export.batch_size as usize;
        let total_batches = total.div_ceil(batch_size);

        let mut by_id: HashMap<String, Conversation> = HashMap::with_capacity(total);

        for (index, chunk) in ids.chunks(batch_size).enumerate() {
            tracing::info!(
                batch = index + 1,
                total_batches,
                count = chunk.len(),
                "Fetching batch"
            );

            let payload = search_payload(ids_query(chunk));
            let fut = self.search_raw(&payload);
            let hits = match deadline {
                Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| {
                    AppError::Cancelled {
                        completed: take_in_order(ids, &mut by_id),
                        total,
                    }
                })??,
                None => fut.await?,
            };

            for hit in &hits {
                let conv = Conversation::from_api_payload(hit).map_err(|e| {
                    match field_as_id(hit.get("id")) {
                        Some(id) => e.for_id(id),
                        None => e,
                    }
                })?;
                by_id.insert(conv.id.clone(), conv);
            }

            // Fail fast on the first requested id the API did not return.
            for id in chunk {
                if !by_id.contains_key(id) {
                    return Err(AppError::NotFound { id: id.clone() });
                }
            }
        }

        collect_in_order(ids, by_id)
    }

    /// Run a caller-supplied search query through the standard envelope.
    ///
    /// # Errors
    /// Returns the terminal fetch or parsing error.
    pub async fn search_conversations(&self, query: Value) -> Result<Vec<Conversation>> {
        let hits = self.search_raw(&search_payload(query)).await?;
        hits.iter().map(Conversation::from_api_payload).collect()
    }

    /// POST the search payload and return the raw conversation hits.
    async fn search_raw(&self, payload: &Value) -> Result<Vec<Value>> {
        let url = format!("{}/conversations/search", self.config.intercom.base_url);
        let body = run_with_retry(&self.policy, &self.sleeper, |_attempt| {
            self.transport.post_json(&url, payload)
        })
        .await?;

        Ok(body
            .get("conversations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// GET the detailed record for one conversation.
    async fn fetch_detail(&self, id: &str) -> Result<Value> {
        let url = format!("{}/conversations/{id}", self.config.intercom.base_url);
        run_with_retry(&self.policy, &self.sleeper, |_attempt| {
            self.transport.get_json(&url)
        })
        .await
    }
}

/// Send one request and classify the outcome.
async fn dispatch(request: RequestBuilder) -> std::result::Result<Value, ClassifiedError> {
    let response = request.send().await.map_err(|e| ClassifiedError {
        classification: Classification::TransientServer { status: None },
        error: AppError::http(e),
    })?;

    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return response.json::<Value>().await.map_err(|e| ClassifiedError {
            // Malformed success bodies are not retryable.
            classification: Classification::PermanentClient { status },
            error: AppError::parsing(format!("malformed response body: {e}")),
        });
    }

    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let classification = classify_status(status, retry_after);
    let excerpt = body_excerpt(&body);

    let error = match &classification {
        Classification::PermanentClient { status } => AppError::PermanentClient {
            status: *status,
            body: excerpt,
        },
        _ => AppError::Http {
            message: format!("status {status}: {excerpt}"),
            source: None,
        },
    };

    Err(ClassifiedError {
        classification,
        error,
    })
}

/// Whether a search hit already carries its opening message. Incomplete
/// hits need the detail-GET fallback.
fn hit_is_complete(hit: &Value) -> bool {
    hit.get("conversation_message").is_some()
}

/// Map an HTTP status to its retry classification.
fn classify_status(status: u16, retry_after: Option<Duration>) -> Classification {
    match status {
        200..=299 => Classification::Success,
        429 => Classification::RateLimited { retry_after },
        400..=499 => Classification::PermanentClient { status },
        _ => Classification::TransientServer {
            status: Some(status),
        },
    }
}

/// Parse a `Retry-After` header given in delay seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Prefer the API's JSON `message` field; fall back to truncated raw text.
fn body_excerpt(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// Wrap a query in the standard search envelope. Every search payload
/// carries `display_as: plaintext` so message bodies arrive unescaped.
fn search_payload(query: Value) -> Value {
    json!({
        "query": query,
        "display_as": "plaintext",
        "sort_field": "created_at",
        "sort_order": "desc",
        "include_messages": true,
        "include_message_parts": true,
        "expand": [
            "conversation_message",
            "conversation_parts",
            "contact",
            "assignee"
        ]
    })
}

/// Query matching a set of conversation ids.
fn ids_query(ids: &[String]) -> Value {
    json!({
        "operator": "OR",
        "value": [{"field": "id", "operator": "IN", "value": ids}]
    })
}

/// Re-emit fetched records in input-id order, naming the first missing id.
fn collect_in_order(
    ids: &[String],
    mut by_id: HashMap<String, Conversation>,
) -> Result<Vec<Conversation>> {
    ids.iter()
        .map(|id| {
            by_id
                .remove(id)
                .ok_or_else(|| AppError::NotFound { id: id.clone() })
        })
        .collect()
}

/// Drain whatever was fetched so far, keeping input-id order.
fn take_in_order(
    ids: &[String],
    by_id: &mut HashMap<String, Conversation>,
) -> Vec<Conversation> {
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use crate::domain::config::{OutputFormat, DEFAULT_OUTPUT_DIR};
    use crate::domain::{ExportConfig, RetryConfig};

    /// Sleeper that completes immediately.
    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
            std::future::ready(())
        }
    }

    /// One canned transport reply.
    enum StubReply {
        Ready(std::result::Result<Value, ClassifiedError>),
        /// Never resolves; stands in for a stalled upstream.
        Hang,
    }

    /// Transport that replays canned replies and records traffic.
    struct StubTransport {
        replies: Mutex<VecDeque<StubReply>>,
        posts: Mutex<Vec<(String, Value)>>,
        gets: Mutex<Vec<String>>,
    }

    impl StubTransport {
        fn new(replies: Vec<StubReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                posts: Mutex::new(Vec::new()),
                gets: Mutex::new(Vec::new()),
            }
        }

        fn next_reply(&self) -> StubReply {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(StubReply::Ready(Ok(json!({"conversations": []}))))
        }
    }

    impl Transport for StubTransport {
        fn post_json(
            &self,
            url: &str,
            body: &Value,
        ) -> impl Future<Output = std::result::Result<Value, ClassifiedError>> + Send {
            self.posts.lock().unwrap().push((url.to_string(), body.clone()));
            let reply = self.next_reply();
            async move {
                match reply {
                    StubReply::Ready(result) => result,
                    StubReply::Hang => std::future::pending().await,
                }
            }
        }

        fn get_json(
            &self,
            url: &str,
        ) -> impl Future<Output = std::result::Result<Value, ClassifiedError>> + Send {
            self.gets.lock().unwrap().push(url.to_string());
            let reply = self.next_reply();
            async move {
                match reply {
                    StubReply::Ready(result) => result,
                    StubReply::Hang => std::future::pending().await,
                }
            }
        }
    }

    fn test_config(batch_size: u32) -> Config {
        Config {
            intercom: IntercomConfig {
                api_token: "test-token".to_string(),
                base_url: "https://api.intercom.io".to_string(),
                api_version: "2.8".to_string(),
            },
            export: ExportConfig {
                output_format: OutputFormat::Markdown,
                output_dir: DEFAULT_OUTPUT_DIR.to_string(),
                batch_size,
                include_metadata: true,
                include_context: true,
            },
            retry: RetryConfig::default(),
            debug: false,
        }
    }

    fn client_with(replies: Vec<StubReply>) -> ApiClient<StubTransport, NoSleep> {
        ApiClient::with_parts(test_config(10), StubTransport::new(replies), NoSleep)
    }

    fn complete_hit(id: &str) -> Value {
        json!({
            "id": id,
            "created_at": 1_672_567_200,
            "state": "open",
            "conversation_message": {
                "id": "msg1",
                "body": "Initial message",
                "author": {"name": "John Doe", "type": "user"},
                "created_at": 1_672_567_200
            }
        })
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200, None), Classification::Success);
        assert_eq!(
            classify_status(429, Some(Duration::from_secs(5))),
            Classification::RateLimited {
                retry_after: Some(Duration::from_secs(5))
            }
        );
        assert_eq!(
            classify_status(503, None),
            Classification::TransientServer { status: Some(503) }
        );
        assert_eq!(
            classify_status(404, None),
            Classification::PermanentClient { status: 404 }
        );
        assert_eq!(
            classify_status(401, None),
            Classification::PermanentClient { status: 401 }
        );
    }

    #[test]
    fn test_search_payload_requests_plaintext() {
        let payload = search_payload(ids_query(&["42".to_string()]));

        assert_eq!(payload["display_as"], "plaintext");
        assert_eq!(payload["query"]["value"][0]["value"], json!(["42"]));
        assert!(payload["expand"]
            .as_array()
            .is_some_and(|e| e.contains(&json!("conversation_message"))));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        // HTTP-date form is ignored rather than misparsed.
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_body_excerpt_prefers_api_message() {
        assert_eq!(
            body_excerpt(r#"{"type":"error","message":"Token invalid"}"#),
            "Token invalid"
        );
        let long = "x".repeat(500);
        assert_eq!(body_excerpt(&long).len(), BODY_EXCERPT_LEN);
    }

    #[test]
    fn test_hit_is_complete() {
        assert!(hit_is_complete(&complete_hit("1")));
        assert!(!hit_is_complete(&json!({"id": "1", "created_at": 1})));
    }

    #[test]
    fn test_collect_in_order_restores_input_order() {
        let ids: Vec<String> = ["1", "2", "3"].iter().map(ToString::to_string).collect();
        let mut by_id = HashMap::new();
        for id in ["3", "1", "2"] {
            let conv = Conversation::from_api_payload(&json!({"id": id, "created_at": 1}))
                .unwrap();
            by_id.insert(id.to_string(), conv);
        }

        let ordered = collect_in_order(&ids, by_id).unwrap();
        let got: Vec<&str> = ordered.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(got, ["1", "2", "3"]);
    }

    #[test]
    fn test_collect_in_order_names_missing_id() {
        let ids: Vec<String> = ["1", "2", "3"].iter().map(ToString::to_string).collect();
        let mut by_id = HashMap::new();
        for id in ["1", "3"] {
            let conv = Conversation::from_api_payload(&json!({"id": id, "created_at": 1}))
                .unwrap();
            by_id.insert(id.to_string(), conv);
        }

        match collect_in_order(&ids, by_id).unwrap_err() {
            AppError::NotFound { id } => assert_eq!(id, "2"),
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_conversation_uses_complete_search_hit() {
        let client = client_with(vec![StubReply::Ready(Ok(
            json!({"conversations": [complete_hit("123")]}),
        ))]);

        let conv = client.fetch_conversation("123").await.unwrap();
        assert_eq!(conv.id, "123");
        assert_eq!(conv.message_count(), 1);

        // Complete hits never trigger the detail GET.
        assert!(client.transport.gets.lock().unwrap().is_empty());
        let posts = client.transport.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.ends_with("/conversations/search"));
        assert_eq!(posts[0].1["display_as"], "plaintext");
    }

    #[tokio::test]
    async fn test_fetch_conversation_falls_back_to_detail_get() {
        let incomplete = json!({"id": "123", "created_at": 1_672_567_200});
        let client = client_with(vec![
            StubReply::Ready(Ok(json!({"conversations": [incomplete]}))),
            StubReply::Ready(Ok(complete_hit("123"))),
        ]);

        let conv = client.fetch_conversation("123").await.unwrap();
        assert_eq!(conv.id, "123");
        assert_eq!(conv.messages[0].body, "Initial message");

        let gets = client.transport.gets.lock().unwrap();
        assert_eq!(gets.len(), 1);
        assert!(gets[0].ends_with("/conversations/123"));
    }

    #[tokio::test]
    async fn test_fetch_conversation_not_found() {
        let client = client_with(vec![StubReply::Ready(Ok(json!({"conversations": []})))]);

        match client.fetch_conversation("123").await.unwrap_err() {
            AppError::NotFound { id } => assert_eq!(id, "123"),
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_search_conversations_wraps_query_and_parses_hits() {
        let client = client_with(vec![StubReply::Ready(Ok(
            json!({"conversations": [complete_hit("7")]}),
        ))]);

        let query = json!({"field": "state", "operator": "=", "value": "open"});
        let results = client.search_conversations(query.clone()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "7");

        let posts = client.transport.posts.lock().unwrap();
        assert_eq!(posts[0].1["query"], query);
        assert_eq!(posts[0].1["display_as"], "plaintext");
    }

    #[tokio::test]
    async fn test_batch_parse_error_names_numeric_id() {
        // Numeric-id hit with no created_at: the error must still name 99.
        let client = client_with(vec![StubReply::Ready(Ok(
            json!({"conversations": [{"id": 99}]}),
        ))]);

        let ids = vec!["99".to_string()];
        match client.fetch_conversations(&ids).await.unwrap_err() {
            AppError::Fetch { id, .. } => assert_eq!(id, "99"),
            other => panic!("expected Fetch, got {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_stalled_batch_with_partial_results() {
        let client = ApiClient::with_parts(
            test_config(2),
            StubTransport::new(vec![
                StubReply::Ready(Ok(
                    json!({"conversations": [complete_hit("1"), complete_hit("2")]}),
                )),
                StubReply::Hang,
            ]),
            NoSleep,
        )
        .with_deadline(Duration::from_secs(5));

        let ids: Vec<String> = ["1", "2", "3"].iter().map(ToString::to_string).collect();
        match client.fetch_conversations(&ids).await.unwrap_err() {
            AppError::Cancelled { completed, total } => {
                assert_eq!(total, 3);
                let got: Vec<&str> = completed.iter().map(|c| c.id.as_str()).collect();
                assert_eq!(got, ["1", "2"]);
            }
            other => panic!("expected Cancelled, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_transient_batch_failure_retries_then_succeeds() {
        let transient = || ClassifiedError {
            classification: Classification::TransientServer { status: Some(503) },
            error: AppError::Http {
                message: "status 503".to_string(),
                source: None,
            },
        };
        let client = client_with(vec![
            StubReply::Ready(Err(transient())),
            StubReply::Ready(Err(transient())),
            StubReply::Ready(Ok(json!({"conversations": [complete_hit("1")]}))),
        ]);

        let ids = vec!["1".to_string()];
        let results = client.fetch_conversations(&ids).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(client.transport.posts.lock().unwrap().len(), 3);
    }
}
