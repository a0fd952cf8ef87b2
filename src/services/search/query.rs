//! Elasticsearch query DSL and index mapping for book documents

use serde_json::{json, Value};

use crate::models::query::{BookFilter, Pagination};

/// Hit cap for the unpaginated title/content searches
pub const MAX_UNPAGED_HITS: i64 = 100;

/// Elasticsearch `index.max_result_window` default; `from + size` may not exceed it
pub const MAX_RESULT_WINDOW: i64 = 10_000;

/// Relevance first, then newest id, so equal scores paginate deterministically
fn ranked_sort() -> Value {
    json!([
        { "_score": { "order": "desc" } },
        { "id": { "order": "desc" } }
    ])
}

fn paged(query: Value, pagination: Pagination) -> Value {
    // Pages past the window come back empty but still carry the total
    let from = pagination.offset().min(MAX_RESULT_WINDOW);
    let size = pagination.page_size.min(MAX_RESULT_WINDOW - from);
    json!({
        "query": query,
        "from": from,
        "size": size,
        "track_total_hits": true,
        "sort": ranked_sort(),
    })
}

fn capped(query: Value) -> Value {
    json!({
        "query": query,
        "size": MAX_UNPAGED_HITS,
        "sort": ranked_sort(),
    })
}

/// Weighted multi-field match, title weighted highest
pub fn keyword_query(keyword: &str, pagination: Pagination) -> Value {
    paged(
        json!({
            "multi_match": {
                "query": keyword,
                "fields": ["title^3", "author^2", "summary^1.5", "content"],
                "type": "best_fields"
            }
        }),
        pagination,
    )
}

/// Conjunctive field match; no filters matches everything
pub fn filter_query(filter: &BookFilter, pagination: Pagination) -> Value {
    let mut must = Vec::new();

    if let Some(ref title) = filter.title {
        must.push(json!({ "match": { "title": title } }));
    }
    if let Some(ref author) = filter.author {
        must.push(json!({ "match": { "author": author } }));
    }
    if let Some(ref isbn) = filter.isbn {
        must.push(json!({ "term": { "isbn": isbn } }));
    }
    if let Some(ref content) = filter.content {
        must.push(json!({ "match": { "content": content } }));
    }

    let query = if must.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "must": must } })
    };

    paged(query, pagination)
}

/// Exact mode hits the unanalyzed `title.keyword` field
pub fn title_query(title: &str, exact: bool) -> Value {
    let query = if exact {
        json!({ "term": { "title.keyword": title } })
    } else {
        json!({ "match": { "title": title } })
    };
    capped(query)
}

pub fn content_query(content: &str) -> Value {
    capped(json!({ "match": { "content": content } }))
}

/// Index settings and mapping. `title` and `author` carry a `keyword`
/// sub-field for exact matching.
pub fn index_mapping(analyzer: &str, search_analyzer: Option<&str>) -> Value {
    let text = |with_keyword: bool| {
        let mut field = json!({ "type": "text", "analyzer": analyzer });
        if let Some(search_analyzer) = search_analyzer {
            field["search_analyzer"] = json!(search_analyzer);
        }
        if with_keyword {
            field["fields"] = json!({ "keyword": { "type": "keyword" } });
        }
        field
    };

    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "properties": {
                "id": { "type": "long" },
                "title": text(true),
                "author": text(true),
                "count": { "type": "long" },
                "isbn": { "type": "keyword" },
                "content": text(false),
                "summary": text(false)
            }
        }
    })
}
