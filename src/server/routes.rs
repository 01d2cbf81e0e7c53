use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};
use maktaba_core::catalog::{
    self, AuthorQuery, BookQuery, ContentQuery, SearchKind, DEFAULT_SEARCH_LIMIT,
};
use maktaba_core::{SyncOutcome, VersionCursor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{ApiError, AppState, Success};

type ApiResult<T> = Result<Json<Success<T>>, ApiError>;

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid book id '{}'", raw)))
}

#[derive(Serialize)]
pub struct IndexResponse {
    name: &'static str,
    version: &'static str,
    endpoints: &'static [&'static str],
}

pub async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        name: "maktaba",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: &[
            "GET /health",
            "GET /api/categories",
            "GET /api/authors",
            "GET /api/books",
            "GET /api/books/{id}",
            "GET /api/books/{id}/content",
            "GET /api/search",
            "GET /api/stats",
            "POST /api/sync/master",
            "POST /api/sync/book/{id}",
        ],
    })
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct Listing<T> {
    count: usize,
    data: Vec<T>,
}

pub async fn categories(State(state): State<AppState>) -> ApiResult<Listing<catalog::CategorySummary>> {
    let master = state.library.get_master()?;
    let data = catalog::categories(&master);
    Ok(Success::new(Listing {
        count: data.len(),
        data,
    }))
}

pub async fn authors(
    State(state): State<AppState>,
    query: Result<Query<AuthorQuery>, QueryRejection>,
) -> ApiResult<catalog::Page<catalog::AuthorSummary>> {
    let Query(query) = query?;
    let master = state.library.get_master()?;
    Ok(Success::new(catalog::authors(&master, &query)))
}

pub async fn books(
    State(state): State<AppState>,
    query: Result<Query<BookQuery>, QueryRejection>,
) -> ApiResult<catalog::Page<catalog::BookSummary>> {
    let Query(query) = query?;
    let master = state.library.get_master()?;
    let downloaded: BTreeSet<i64> = state.library.downloaded_books()?.into_iter().collect();
    Ok(Success::new(catalog::books(&master, &query, |id| {
        downloaded.contains(&id)
    })))
}

#[derive(Serialize)]
pub struct Item<T> {
    data: T,
}

pub async fn book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Item<catalog::BookDetails>> {
    let id = parse_id(&id)?;
    let master = state.library.get_master()?;
    let local = state.library.local_book(id)?;
    let details = catalog::book_details(&master, id, local.as_ref())
        .ok_or_else(|| ApiError::NotFound(format!("Book {} not found", id)))?;
    Ok(Success::new(Item { data: details }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    book_id: i64,
    #[serde(flatten)]
    content: catalog::BookContent,
}

/// Content of a book, downloading it first if there is no local copy.
pub async fn book_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ContentQuery>, QueryRejection>,
) -> ApiResult<ContentResponse> {
    let id = parse_id(&id)?;
    let Query(query) = query?;
    let book = state
        .library
        .get_book_content(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book {} has no content available", id)))?;
    let content = catalog::book_content(&book, &query).map_err(maktaba_core::SyncError::from)?;
    Ok(Success::new(ContentResponse {
        book_id: id,
        content,
    }))
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
    #[serde(rename = "type", default)]
    kind: SearchKind,
    limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    query: String,
    results: catalog::SearchResults,
}

pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<SearchResponse> {
    let Query(params) = params?;
    let query = params.q.unwrap_or_default().trim().to_string();
    let master = state.library.get_master()?;
    let results = catalog::search(
        &master,
        &query,
        params.kind,
        params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    );
    Ok(Success::new(SearchResponse { query, results }))
}

#[derive(Serialize)]
pub struct StatsResponse {
    stats: catalog::Stats,
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let master = state.library.get_master()?;
    let downloaded = state.library.downloaded_books()?.len();
    Ok(Success::new(StatsResponse {
        stats: catalog::stats(&master, downloaded),
    }))
}

#[derive(Serialize)]
pub struct SyncResponse {
    message: &'static str,
    updated: bool,
    #[serde(flatten)]
    cursor: VersionCursor,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<BTreeMap<String, usize>>,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::UpToDate { cursor } => Self {
                message: "Already up to date",
                updated: false,
                cursor,
                counts: None,
            },
            SyncOutcome::Updated { cursor, counts } => Self {
                message: "Sync completed",
                updated: true,
                cursor,
                counts: Some(counts),
            },
        }
    }
}

pub async fn sync_master(State(state): State<AppState>) -> ApiResult<SyncResponse> {
    let outcome = state.library.sync_master().await?;
    Ok(Success::new(outcome.into()))
}

pub async fn sync_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SyncResponse> {
    let id = parse_id(&id)?;
    let outcome = state.library.sync_book(id).await?;
    Ok(Success::new(outcome.into()))
}

#[cfg(test)]
mod tests {
    use crate::server::{router, AppState};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use maktaba_core::record::tables;
    use maktaba_core::{
        Dataset, DatasetKind, HttpPatchSource, Library, MemorySnapshotStore, MemoryVersionStore,
        Record, SnapshotStore, SqliteTableReader,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn master() -> Dataset {
        let mut master = Dataset::empty(DatasetKind::Master);
        master.set_table(
            tables::CATEGORY,
            vec![Record::new(1).with("name", "Hadith").with("order", 1_i64)].into(),
        );
        master.set_table(
            tables::AUTHOR,
            vec![Record::new(10).with("name", "Bukhari").with("death_text", "256 AH")].into(),
        );
        master.set_table(
            tables::BOOK,
            vec![
                Record::new(100)
                    .with("name", "Sahih")
                    .with("author", "10")
                    .with("category", 1_i64)
                    .with("date", 256_i64),
                Record::new(101).with("name", "Adab").with("author", "10"),
            ]
            .into(),
        );
        master
    }

    fn book() -> Dataset {
        let mut book = Dataset::empty(DatasetKind::Book);
        book.set_table(
            tables::PAGE,
            vec![
                Record::new(1).with("page", 1_i64).with("content", "first"),
                Record::new(2).with("page", 2_i64).with("content", "second"),
            ]
            .into(),
        );
        book.set_table(
            tables::TITLE,
            vec![Record::new(1).with("page", 1_i64).with("content", "Intro")].into(),
        );
        book
    }

    /// A router over in-memory stores whose remote cannot be reached.
    fn app() -> Router {
        let snapshots = Arc::new(MemorySnapshotStore::with_master(master()));
        snapshots.save_book(100, &book()).unwrap();
        let source = HttpPatchSource::new("http://127.0.0.1:9/api", "key")
            .with_timeout(Duration::from_secs(2));
        let library = Library::new(
            Arc::new(source),
            Arc::new(SqliteTableReader::new()),
            Arc::new(MemoryVersionStore::new()),
            snapshots,
        );
        router(AppState::new(library))
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(app(), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_categories() {
        let (status, body) = call(app(), "GET", "/api/categories").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["name"], "Hadith");
        assert_eq!(body["data"][0]["bookCount"], 1);
    }

    #[tokio::test]
    async fn test_books_mark_downloaded() {
        let (status, body) = call(app(), "GET", "/api/books?limit=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        let data = body["data"].as_array().unwrap();
        let sahih = data.iter().find(|b| b["id"] == 100).unwrap();
        let adab = data.iter().find(|b| b["id"] == 101).unwrap();
        assert_eq!(sahih["isDownloaded"], true);
        assert_eq!(sahih["author"], "Bukhari");
        assert_eq!(adab["isDownloaded"], false);
    }

    #[tokio::test]
    async fn test_book_details_and_unknown_book() {
        let (status, body) = call(app(), "GET", "/api/books/100").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["hasContent"], true);
        assert_eq!(body["data"]["pageCount"], 2);

        let (status, body) = call(app(), "GET", "/api/books/7").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("7"));

        let (status, body) = call(app(), "GET", "/api/books/abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_local_content_is_served_without_network() {
        let (status, body) = call(app(), "GET", "/api/books/100/content?page=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bookId"], 100);
        assert_eq!(body["totalPages"], 2);
        assert_eq!(body["pages"].as_array().unwrap().len(), 1);
        assert_eq!(body["pages"][0]["content"], "second");
        assert_eq!(body["titles"][0]["content"], "Intro");
    }

    #[tokio::test]
    async fn test_missing_content_with_unreachable_remote_is_server_error() {
        let (status, body) = call(app(), "GET", "/api/books/101/content").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(!body["error"].as_str().unwrap().contains("api_key"));
    }

    #[tokio::test]
    async fn test_search() {
        let (status, body) = call(app(), "GET", "/api/search?q=sah&type=books").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"], "sah");
        assert_eq!(body["results"]["books"][0]["id"], 100);
        assert!(body["results"]["authors"].as_array().unwrap().is_empty());

        let (status, body) = call(app(), "GET", "/api/search?q=s").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["results"]["books"].as_array().unwrap().is_empty());
        assert!(body["results"]["authors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_query_values_use_error_envelope() {
        for uri in [
            "/api/books?limit=abc",
            "/api/authors?offset=-1",
            "/api/search?q=sahih&type=pages",
            "/api/books/100/content?page=first",
        ] {
            let (status, body) = call(app(), "GET", uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["success"], false, "{}", uri);
            assert!(body["error"].is_string(), "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_stats() {
        let (status, body) = call(app(), "GET", "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["books"], 2);
        assert_eq!(body["stats"]["downloadedBooks"], 1);
    }

    #[tokio::test]
    async fn test_sync_failure_reports_error() {
        let (status, body) = call(app(), "POST", "/api/sync/master").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }
}
