#![cfg(unix)]

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum_test::TestServer;
use paperdesk::api::create_router;
use paperdesk::config::ServiceConfig;
use paperdesk::db::Database;
use paperdesk::lifecycle::SessionManager;
use paperdesk::models::*;
use serde_json::{json, Value};
use tempfile::TempDir;

const WORKER: &str = r#"
cmd="$1"; shift
case "$cmd" in
  search)
    while [ $# -gt 0 ]; do
      if [ "$1" = "-o" ]; then out="$2"; fi
      shift
    done
    printf '# Paper One\n\n**Authors:** Jane Doe\n' > "$out/paper1.md"
    echo '{}' > "$out/_session_info.json"
    ;;
  analyze)
    echo '# Comparison' > "$1/_comparative_analysis.md"
    ;;
esac
exit 0
"#;

fn setup() -> (TestServer, TempDir) {
    setup_with_worker(WORKER)
}

fn setup_with_worker(worker: &str) -> (TestServer, TempDir) {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let script = tmp.path().join("worker.sh");
    std::fs::write(&script, worker).expect("Failed to write worker");

    let config = ServiceConfig::new(tmp.path().join("summaries"))
        .with_worker("sh", [script.to_string_lossy().into_owned()]);
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");

    let app = create_router(SessionManager::new(db, config));
    let server = TestServer::new(app).expect("Failed to create test server");
    (server, tmp)
}

async fn start_search(server: &TestServer, query: &str) -> Query {
    let response = server
        .post("/api/search")
        .json(&json!({ "query": query }))
        .await;
    response.assert_status_ok();
    response.json::<Query>()
}

async fn settle(server: &TestServer, id: &str) -> Query {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let query = server
            .get(&format!("/api/queries/{}", id))
            .await
            .json::<Query>();
        if !query.status.is_in_flight() {
            return query;
        }
        assert!(Instant::now() < deadline, "session {} never settled", id);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let (server, _tmp) = setup();

        let response = server.get("/api/health").await;

        response.assert_status_ok();
        response.assert_json(&json!({ "status": "ok" }));
    }
}

mod search {
    use super::*;

    #[tokio::test]
    async fn creates_a_processing_session_with_defaults() {
        let (server, _tmp) = setup();

        let query = start_search(&server, "sparse attention").await;

        assert_eq!(query.query, "sparse attention");
        assert_eq!(query.status, QueryStatus::Processing);
        assert_eq!(query.num_papers, 3);
        assert_eq!(query.provider, "deepseek");
    }

    #[tokio::test]
    async fn honors_explicit_parameters() {
        let (server, _tmp) = setup();

        let response = server
            .post("/api/search")
            .json(&json!({
                "query": "protein folding",
                "num_results": 7,
                "sort_by_date": true,
                "provider": "openai",
                "full_text": false
            }))
            .await;

        response.assert_status_ok();
        let query: Query = response.json();
        assert_eq!(query.num_papers, 7);
        assert_eq!(query.provider, "openai");
    }

    #[tokio::test]
    async fn session_completes_with_its_summaries() {
        let (server, _tmp) = setup();
        let query = start_search(&server, "q").await;

        let settled = settle(&server, &query.id).await;
        assert_eq!(settled.status, QueryStatus::Completed);

        let response = server
            .get(&format!("/api/queries/{}/summaries", query.id))
            .await;
        response.assert_status_ok();
        let summaries: Vec<Summary> = response.json();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].title, "Paper One");
        assert_eq!(summaries[0].authors, "Jane Doe");
    }

    #[tokio::test]
    async fn rejects_an_empty_query() {
        let (server, _tmp) = setup();

        let response = server.post("/api/search").json(&json!({ "query": "" })).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let listed: Vec<Query> = server.get("/api/queries").await.json();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn rejects_zero_results() {
        let (server, _tmp) = setup();

        let response = server
            .post("/api/search")
            .json(&json!({ "query": "q", "num_results": 0 }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn lists_newest_first() {
        let (server, _tmp) = setup();
        let first = start_search(&server, "first").await;
        let second = start_search(&server, "second").await;

        let listed: Vec<Query> = server.get("/api/queries").await.json();

        let ids: Vec<&str> = listed.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    }

    #[tokio::test]
    async fn returns_404_for_unknown_session() {
        let (server, _tmp) = setup();

        let response = server.get("/api/queries/does-not-exist").await;

        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["detail"], "Query not found");
    }

    #[tokio::test]
    async fn unknown_session_has_no_summaries() {
        let (server, _tmp) = setup();

        let response = server.get("/api/queries/does-not-exist/summaries").await;

        response.assert_status_ok();
        let summaries: Vec<Summary> = response.json();
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn serializes_creation_time_as_timestamp() {
        let (server, _tmp) = setup();
        let query = start_search(&server, "q").await;

        let body: Value = server
            .get(&format!("/api/queries/{}", query.id))
            .await
            .json();

        assert!(body["timestamp"].is_string());
        assert_eq!(body["id"], query.id.as_str());
    }
}

mod analysis {
    use super::*;

    #[tokio::test]
    async fn starts_analysis_on_completed_session_and_serves_result() {
        let (server, _tmp) = setup();
        let query = start_search(&server, "q").await;
        settle(&server, &query.id).await;

        let pending = server.get(&format!("/api/analysis/{}", query.id)).await;
        pending.assert_status_ok();
        pending.assert_json(&json!({ "status": "pending" }));

        let response = server
            .post("/api/analyze")
            .json(&json!({ "session_id": query.id }))
            .await;
        response.assert_status_ok();
        let ack: AnalyzeResponse = response.json();
        assert_eq!(ack.message, "Analysis started");
        assert_eq!(ack.session_id, query.id);

        assert_eq!(settle(&server, &query.id).await.status, QueryStatus::Completed);

        let done: AnalysisResponse = server
            .get(&format!("/api/analysis/{}", query.id))
            .await
            .json();
        assert_eq!(
            done,
            AnalysisResponse::Completed {
                content: "# Comparison\n".to_string()
            }
        );
    }

    #[tokio::test]
    async fn analyze_unknown_session_returns_404() {
        let (server, _tmp) = setup();

        let response = server
            .post("/api/analyze")
            .json(&json!({ "session_id": "does-not-exist" }))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        let listed: Vec<Query> = server.get("/api/queries").await.json();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn analyze_failed_session_returns_409() {
        let (server, _tmp) = setup_with_worker("exit 2");
        let query = start_search(&server, "q").await;
        assert_eq!(settle(&server, &query.id).await.status, QueryStatus::Failed);

        let response = server
            .post("/api/analyze")
            .json(&json!({ "session_id": query.id }))
            .await;

        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(settle(&server, &query.id).await.status, QueryStatus::Failed);
    }

    #[tokio::test]
    async fn analysis_for_unknown_session_returns_404() {
        let (server, _tmp) = setup();

        let response = server.get("/api/analysis/does-not-exist").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }
}
