//! Elasticsearch client for the book index, over the plain HTTP API

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{query, BulkReport, IndexError, IndexResult, SearchHits, SearchIndex};
use crate::{
    config::SearchConfig,
    models::{
        book::BookDocument,
        query::{BookFilter, Pagination},
    },
};

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct TotalHits {
    value: i64,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: BookDocument,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<BookDocument>,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Extract `(type, reason)` from an Elasticsearch error body
fn error_details(body: &str) -> (Option<String>, String) {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);

    let kind = error
        .and_then(|e| e["type"].as_str())
        .map(str::to_string);
    let reason = error
        .and_then(|e| e["reason"].as_str().or_else(|| e.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());

    (kind, reason)
}

/// Error answers an operation accepts as success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tolerate {
    Nothing,
    /// 404: the index or document is already gone
    Missing,
    /// `resource_already_exists_exception`: the index is already there
    AlreadyExists,
}

/// Map an error answer to an `IndexError`. A missing index counts as
/// unavailable so searches degrade instead of failing.
fn error_for(index: &str, status: StatusCode, body: &str) -> IndexError {
    let (kind, reason) = error_details(body);
    if kind.as_deref() == Some("index_not_found_exception") {
        return IndexError::Unavailable(format!("index '{}' does not exist", index));
    }
    IndexError::Rejected {
        status: status.as_u16(),
        reason,
    }
}

fn classify(index: &str, status: StatusCode, body: &str, tolerate: Tolerate) -> IndexResult<()> {
    if status.is_success() {
        return Ok(());
    }
    let tolerated = match tolerate {
        Tolerate::Nothing => false,
        Tolerate::Missing => status == StatusCode::NOT_FOUND,
        Tolerate::AlreadyExists => {
            error_details(body).0.as_deref() == Some("resource_already_exists_exception")
        }
    };
    if tolerated {
        Ok(())
    } else {
        Err(error_for(index, status, body))
    }
}

fn parse_bulk_response(body: BulkResponse) -> BulkReport {
    let mut report = BulkReport::default();

    for item in body.items {
        for (_, result) in item {
            let failed = result.error.is_some() || result.status >= 300;
            if !failed {
                report.indexed += 1;
                continue;
            }
            let reason = result
                .error
                .as_ref()
                .and_then(|e| e["reason"].as_str())
                .unwrap_or("bulk item failed")
                .to_string();
            match result.id.parse::<i64>() {
                Ok(id) => report.failed.push((id, reason)),
                Err(_) => tracing::warn!("Bulk item with unexpected id '{}': {}", result.id, reason),
            }
        }
    }

    report
}

pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
    analyzer: String,
    search_analyzer: Option<String>,
}

impl ElasticsearchIndex {
    pub fn new(url: &str, config: &SearchConfig) -> IndexResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            username: config.username.clone().filter(|u| !u.is_empty()),
            password: config.password.clone(),
            analyzer: config.analyzer.clone(),
            search_analyzer: config.search_analyzer.clone(),
        })
    }

    fn index_url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.index, path)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.username {
            Some(ref username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> IndexResult<Response> {
        builder
            .send()
            .await
            .map_err(|e| IndexError::Unavailable(e.to_string()))
    }

    /// Settle a response whose body is not needed
    async fn settle(&self, response: Response, tolerate: Tolerate) -> IndexResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        classify(&self.index, status, &body, tolerate)
    }

    /// Pass a successful response through for decoding
    async fn success(&self, response: Response) -> IndexResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for(&self.index, status, &body))
    }

    async fn run_search(&self, body: Value) -> IndexResult<SearchHits> {
        let response = self
            .send(self.request(Method::POST, self.index_url("/_search")).json(&body))
            .await?;

        let parsed: SearchResponse = self
            .success(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;

        let documents: Vec<BookDocument> = parsed.hits.hits.into_iter().map(|h| h.source).collect();
        let total = parsed
            .hits
            .total
            .map(|t| t.value)
            .unwrap_or(documents.len() as i64);

        Ok(SearchHits { total, documents })
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn ping(&self) -> IndexResult<()> {
        let response = self
            .send(self.request(Method::GET, format!("{}/", self.base_url)))
            .await?;
        self.settle(response, Tolerate::Nothing).await
    }

    async fn create_index(&self) -> IndexResult<()> {
        let mapping = query::index_mapping(&self.analyzer, self.search_analyzer.as_deref());
        let response = self
            .send(self.request(Method::PUT, self.index_url("")).json(&mapping))
            .await?;

        let created = response.status().is_success();
        self.settle(response, Tolerate::AlreadyExists).await?;
        if created {
            tracing::info!("Created search index '{}'", self.index);
        } else {
            tracing::info!("Search index '{}' already exists", self.index);
        }
        Ok(())
    }

    async fn delete_index(&self) -> IndexResult<()> {
        let response = self
            .send(self.request(Method::DELETE, self.index_url("")))
            .await?;
        self.settle(response, Tolerate::Missing).await
    }

    async fn index_document(&self, doc: &BookDocument) -> IndexResult<()> {
        let url = self.index_url(&format!("/_doc/{}?refresh=true", doc.id));
        let response = self
            .send(self.request(Method::PUT, url).json(doc))
            .await?;
        self.settle(response, Tolerate::Nothing).await?;

        tracing::debug!("Indexed book '{}' (id {})", doc.title, doc.id);
        Ok(())
    }

    async fn bulk_index(&self, docs: &[BookDocument]) -> IndexResult<BulkReport> {
        if docs.is_empty() {
            return Ok(BulkReport::default());
        }

        let mut payload = String::new();
        for doc in docs {
            let action = serde_json::json!({ "index": { "_index": self.index, "_id": doc.id.to_string() } });
            let source = serde_json::to_string(doc).map_err(|e| IndexError::Decode(e.to_string()))?;
            payload.push_str(&action.to_string());
            payload.push('\n');
            payload.push_str(&source);
            payload.push('\n');
        }

        let url = format!("{}/_bulk?refresh=true", self.base_url);
        let response = self
            .send(
                self.request(Method::POST, url)
                    .header(CONTENT_TYPE, "application/x-ndjson")
                    .body(payload),
            )
            .await?;

        let parsed: BulkResponse = self
            .success(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;

        Ok(parse_bulk_response(parsed))
    }

    async fn delete_document(&self, id: i64) -> IndexResult<()> {
        let url = self.index_url(&format!("/_doc/{}?refresh=true", id));
        let response = self.send(self.request(Method::DELETE, url)).await?;
        self.settle(response, Tolerate::Missing).await
    }

    async fn get_document(&self, id: i64) -> IndexResult<Option<BookDocument>> {
        let url = self.index_url(&format!("/_doc/{}", id));
        let response = self.send(self.request(Method::GET, url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            // A missing document is `None`; a missing index is not
            let body = response.text().await.unwrap_or_default();
            let err = error_for(&self.index, StatusCode::NOT_FOUND, &body);
            return if err.is_unavailable() { Err(err) } else { Ok(None) };
        }

        let parsed: GetResponse = self
            .success(response)
            .await?
            .json()
            .await
            .map_err(|e| IndexError::Decode(e.to_string()))?;

        Ok(if parsed.found { parsed.source } else { None })
    }

    async fn search_by_keyword(&self, keyword: &str, pagination: Pagination) -> IndexResult<SearchHits> {
        self.run_search(query::keyword_query(keyword, pagination)).await
    }

    async fn search_by_filters(&self, filter: &BookFilter, pagination: Pagination) -> IndexResult<SearchHits> {
        self.run_search(query::filter_query(filter, pagination)).await
    }

    async fn search_by_title(&self, title: &str, exact: bool) -> IndexResult<Vec<BookDocument>> {
        Ok(self.run_search(query::title_query(title, exact)).await?.documents)
    }

    async fn search_by_content(&self, content: &str) -> IndexResult<Vec<BookDocument>> {
        Ok(self.run_search(query::content_query(content)).await?.documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_details() {
        let body = r#"{"error":{"type":"resource_already_exists_exception","reason":"index [books/abc] already exists"},"status":400}"#;
        let (kind, reason) = error_details(body);
        assert_eq!(kind.as_deref(), Some("resource_already_exists_exception"));
        assert!(reason.contains("already exists"));

        let (kind, reason) = error_details("gateway timeout");
        assert_eq!(kind, None);
        assert_eq!(reason, "gateway timeout");
    }

    const INDEX_MISSING: &str = r#"{"error":{"type":"index_not_found_exception","reason":"no such index [books]"},"status":404}"#;
    const ALREADY_EXISTS: &str = r#"{"error":{"type":"resource_already_exists_exception","reason":"index [books/abc] already exists"},"status":400}"#;

    #[test]
    fn test_create_tolerates_existing_index_only() {
        assert!(classify("books", StatusCode::OK, "{}", Tolerate::AlreadyExists).is_ok());
        assert!(classify("books", StatusCode::BAD_REQUEST, ALREADY_EXISTS, Tolerate::AlreadyExists).is_ok());

        let bad_mapping = r#"{"error":{"type":"mapper_parsing_exception","reason":"analyzer [ik_max_word] not found"},"status":400}"#;
        match classify("books", StatusCode::BAD_REQUEST, bad_mapping, Tolerate::AlreadyExists) {
            Err(IndexError::Rejected { status, reason }) => {
                assert_eq!(status, 400);
                assert!(reason.contains("ik_max_word"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        // Only the create path treats "already exists" as success
        assert!(matches!(
            classify("books", StatusCode::BAD_REQUEST, ALREADY_EXISTS, Tolerate::Nothing),
            Err(IndexError::Rejected { status: 400, .. })
        ));
    }

    #[test]
    fn test_deletes_tolerate_missing() {
        assert!(classify("books", StatusCode::NOT_FOUND, INDEX_MISSING, Tolerate::Missing).is_ok());
        let doc_missing = r#"{"_index":"books","_id":"7","result":"not_found"}"#;
        assert!(classify("books", StatusCode::NOT_FOUND, doc_missing, Tolerate::Missing).is_ok());

        assert!(matches!(
            classify("books", StatusCode::FORBIDDEN, "{}", Tolerate::Missing),
            Err(IndexError::Rejected { status: 403, .. })
        ));
    }

    #[test]
    fn test_missing_index_is_unavailable() {
        let err = error_for("books", StatusCode::NOT_FOUND, INDEX_MISSING);
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("books"));

        assert!(matches!(
            classify("books", StatusCode::NOT_FOUND, INDEX_MISSING, Tolerate::Nothing),
            Err(IndexError::Unavailable(_))
        ));
    }

    #[test]
    fn test_error_statuses_are_rejections() {
        let parse_error = r#"{"error":{"type":"parsing_exception","reason":"unknown query [mach]"},"status":400}"#;
        match error_for("books", StatusCode::BAD_REQUEST, parse_error) {
            IndexError::Rejected { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "unknown query [mach]");
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        match error_for("books", StatusCode::BAD_GATEWAY, "upstream connect error") {
            IndexError::Rejected { status, reason } => {
                assert_eq!(status, 502);
                assert_eq!(reason, "upstream connect error");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bulk_response_reports_failures() {
        let body: BulkResponse = serde_json::from_value(serde_json::json!({
            "took": 3,
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 201 } },
                { "index": { "_id": "2", "status": 400, "error": { "type": "mapper_parsing_exception", "reason": "failed to parse field [count]" } } },
                { "index": { "_id": "3", "status": 200 } }
            ]
        }))
        .unwrap();

        let report = parse_bulk_response(body);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 2);
        assert!(report.failed[0].1.contains("count"));
    }

    #[test]
    fn test_search_response_decoding() {
        let parsed: SearchResponse = serde_json::from_value(serde_json::json!({
            "hits": {
                "total": { "value": 12, "relation": "eq" },
                "hits": [
                    { "_id": "5", "_score": 1.2, "_source": { "id": 5, "title": "Learning Go", "count": 2, "author": "Jon Bodner", "isbn": "9781492077213", "summary": "" } }
                ]
            }
        }))
        .unwrap();

        assert_eq!(parsed.hits.total.map(|t| t.value), Some(12));
        assert_eq!(parsed.hits.hits[0].source.title, "Learning Go");
        assert_eq!(parsed.hits.hits[0].source.content, "");
    }

    #[test]
    fn test_index_url() {
        let config = SearchConfig::default();
        let index = ElasticsearchIndex::new("http://localhost:9200/", &config).unwrap();
        assert_eq!(index.index_url("/_doc/7"), "http://localhost:9200/books/_doc/7");
    }
}
