use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use ragchat_core::errors::SearchError;
use ragchat_core::retrieval::SearchResponse;
use ragchat_core::search::SearchBackend;

use crate::decode;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub enum EsAuth {
    None,
    Basic { username: String, password: SecretString },
    ApiKey(SecretString),
}

#[derive(Clone, Debug)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub auth: EsAuth,
    pub request_timeout: Duration,
    /// Applied as `size` when the request body sets none.
    pub max_hits: Option<u32>,
    /// Field holding the text of a nested chunk match.
    pub chunk_text_field: String,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".into(),
            auth: EsAuth::None,
            request_timeout: Duration::from_secs(90),
            max_hits: None,
            chunk_text_field: "text".into(),
        }
    }
}

/// Elasticsearch REST backend: one `POST /{index}/_search` per call.
pub struct ElasticsearchBackend {
    client: Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchBackend {
    pub fn new(config: ElasticsearchConfig) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(config.request_timeout)
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }

    fn search_url(&self, index: &str) -> String {
        format!("{}/{}/_search", self.config.url.trim_end_matches('/'), index)
    }

    fn request_body(&self, body: &Value) -> Value {
        let mut body = body.clone();
        if let (Some(max), Some(obj)) = (self.config.max_hits, body.as_object_mut()) {
            obj.entry("size").or_insert_with(|| Value::from(max));
        }
        body
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    #[instrument(skip(self, body), fields(index = %index))]
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, SearchError> {
        if !body.is_object() {
            return Err(SearchError::InvalidQuery("request body must be a JSON object".into()));
        }

        let mut req = self
            .client
            .post(self.search_url(index))
            .header("content-type", "application/json")
            .json(&self.request_body(body));

        req = match &self.config.auth {
            EsAuth::None => req,
            EsAuth::Basic { username, password } => {
                req.basic_auth(username, Some(password.expose_secret()))
            }
            EsAuth::ApiKey(key) => {
                req.header("authorization", format!("ApiKey {}", key.expose_secret()))
            }
        };

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout(self.config.request_timeout)
            } else {
                SearchError::Network(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout(self.config.request_timeout)
            } else {
                SearchError::Network(e.to_string())
            }
        })?;

        if !(200..300).contains(&status) {
            let err = SearchError::from_status(status, index, text);
            warn!(status, kind = err.error_kind(), "search request failed");
            return Err(err);
        }

        let response = decode::decode_response(&text, &self.config.chunk_text_field)?;
        debug!(hits = response.hits.len(), took_ms = response.took_ms, "search complete");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    /// Stub cluster: `notary_missing` does not exist, every other index
    /// returns one hit.
    async fn stub_cluster() -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));

        async fn handler(
            State(seen): State<Seen>,
            Path(index): Path<String>,
            headers: HeaderMap,
            Json(body): Json<Value>,
        ) -> (StatusCode, String) {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            seen.lock().push((index.clone(), auth, body));
            if index == "notary_missing" {
                let body = json!({
                    "error": {"type": "index_not_found_exception", "reason": "no such index [notary_missing]"},
                    "status": 404
                });
                return (StatusCode::NOT_FOUND, body.to_string());
            }
            let body = json!({
                "took": 2,
                "hits": {"total": {"value": 1}, "hits": [
                    {"_index": index, "_id": "1", "_score": 1.0, "_source": {"body": "text"}}
                ]}
            });
            (StatusCode::OK, body.to_string())
        }

        let app = Router::new()
            .route("/{index}/_search", post(handler))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn search_posts_body_and_decodes() {
        let (url, seen) = stub_cluster().await;
        let backend = ElasticsearchBackend::new(ElasticsearchConfig {
            url,
            auth: EsAuth::ApiKey(SecretString::from("k123")),
            max_hits: Some(5),
            ..Default::default()
        });

        let resp = backend
            .search("notary_ohio", &json!({"query": {"match_all": {}}}))
            .await
            .unwrap();
        assert_eq!(resp.hits.len(), 1);
        assert_eq!(resp.hits[0].index, "notary_ohio");

        let seen = seen.lock();
        assert_eq!(seen[0].0, "notary_ohio");
        assert_eq!(seen[0].1.as_deref(), Some("ApiKey k123"));
        assert_eq!(seen[0].2["size"], 5);
    }

    #[tokio::test]
    async fn missing_index_is_partition_not_found() {
        let (url, _) = stub_cluster().await;
        let backend = ElasticsearchBackend::new(ElasticsearchConfig { url, ..Default::default() });

        let err = backend
            .search("notary_missing", &json!({"query": {"match_all": {}}}))
            .await
            .unwrap_err();
        assert!(err.is_partition_not_found(), "got {err:?}");
    }

    #[tokio::test]
    async fn basic_auth_header_is_sent() {
        let (url, seen) = stub_cluster().await;
        let backend = ElasticsearchBackend::new(ElasticsearchConfig {
            url,
            auth: EsAuth::Basic {
                username: "elastic".into(),
                password: SecretString::from("changeme"),
            },
            ..Default::default()
        });
        backend.search("notary_*", &json!({"size": 2})).await.unwrap();
        let seen = seen.lock();
        assert!(seen[0].1.as_deref().unwrap().starts_with("Basic "));
        assert_eq!(seen[0].2["size"], 2);
    }

    #[tokio::test]
    async fn non_object_body_is_rejected_locally() {
        let backend = ElasticsearchBackend::new(ElasticsearchConfig::default());
        let err = backend.search("notary_*", &json!(["not", "an", "object"])).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn unreachable_cluster_is_network_error() {
        let backend = ElasticsearchBackend::new(ElasticsearchConfig {
            url: "http://127.0.0.1:1".into(),
            ..Default::default()
        });
        let err = backend.search("notary_*", &json!({})).await.unwrap_err();
        assert!(matches!(err, SearchError::Network(_) | SearchError::Timeout(_)), "got {err:?}");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let backend = ElasticsearchBackend::new(ElasticsearchConfig {
            url: "http://es:9200/".into(),
            ..Default::default()
        });
        assert_eq!(backend.search_url("notary_*"), "http://es:9200/notary_*/_search");
    }
}
