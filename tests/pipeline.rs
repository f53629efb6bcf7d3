//! End-to-end scenarios against a disposable Postgres instance,
//! following the literal inputs/outputs laid out for the recommendation
//! pipeline: ingestion, threshold gating, hour gating, deduplication,
//! and the dispatcher's retriable/permanent failure handling.

use std::path::PathBuf;
use std::sync::Arc;

use papersorter::dedupe::{DedupeConfig, Deduper};
use papersorter::dispatch::dispatcher::Dispatcher;
use papersorter::dispatch::providers::{chat_a::ChatAProvider, chat_b::ChatBProvider, email::EmailProvider};
use papersorter::config::{NotificationConfig, SmtpConfig};
use papersorter::feed::parser::CandidateArticle;
use papersorter::orchestrator::BroadcastDriver;
use papersorter::queue::QueueManager;
use papersorter::scoring::{ModelArtifact, PredictorKind};
use papersorter::store::{Channel, Database, EventSeverity};

use chrono::{TimeZone, Utc};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_db() -> (Database, testcontainers::ContainerAsync<Postgres>) {
    let container = Postgres::default()
        .with_db_name("papersorter")
        .with_user("papersorter")
        .with_password("papersorter")
        .start()
        .await
        .expect("postgres container starts");
    let port = container.get_host_port_ipv4(5432).await.expect("mapped port");

    let config = papersorter::config::DbConfig {
        host: "127.0.0.1".into(),
        port,
        user: "papersorter".into(),
        password: secrecy::SecretString::from("papersorter".to_string()),
        database: "papersorter".into(),
    };
    let db = Database::open(&config, 4).await.expect("db opens and migrates");
    (db, container)
}

fn unit_artifact(dim: usize, constant_score: f64) -> ModelArtifact {
    // Inverse-sigmoid bias so `predict` returns exactly `constant_score`
    // for a zero embedding, regardless of dimension.
    let bias = (constant_score / (1.0 - constant_score)).ln();
    ModelArtifact {
        dim,
        mean: vec![0.0; dim],
        std: vec![1.0; dim],
        predictor: PredictorKind::LogisticLinear { weights: vec![0.0; dim], bias },
    }
}

async fn seed_active_model(db: &Database, model_dir: &PathBuf, constant_score: f64, dim: usize) -> i64 {
    let model = db.create_model("test-model", "relevance").await.unwrap();
    db.set_model_active(model.id, true).await.unwrap();
    std::fs::create_dir_all(model_dir).unwrap();
    unit_artifact(dim, constant_score).save(model_dir, model.id).unwrap();
    model.id
}

async fn seed_channel(db: &Database, model_id: i64, endpoint: &str, threshold: f64) -> Channel {
    db.create_channel("test-channel", endpoint, threshold, model_id, 20).await.unwrap()
}

fn notification_config() -> NotificationConfig {
    NotificationConfig {
        global_rate_per_sec: 1000.0,
        global_burst: 1000,
        global_claim_cap: 100,
        feedback_base_url: "https://papersorter.local".into(),
    }
}

fn build_dispatcher(config: NotificationConfig) -> Dispatcher {
    let http = reqwest::Client::new();
    let chat_a = ChatAProvider::new(http.clone(), "https://papersorter.local".into());
    let chat_b = ChatBProvider::new(http, "https://papersorter.local".into());
    let email = EmailProvider::new(&SmtpConfig::default(), "https://papersorter.local".into())
        .expect("default smtp config builds a transport even when unused");
    Dispatcher::new(chat_a, chat_b, email, config)
}

#[tokio::test]
async fn scenario_a_happy_path_ingestion() {
    let (db, _container) = test_db().await;
    let model_dir = std::env::temp_dir().join(format!("papersorter-test-a-{}", uuid_ish()));

    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock)
        .await;

    let model_id = seed_active_model(&db, &model_dir, 0.80, 4).await;
    let channel = seed_channel(&db, model_id, &format!("{}/webhook", mock.uri()), 0.5).await;

    let deduper = Deduper::new(DedupeConfig::default());
    let candidate = CandidateArticle {
        external_id: "x1".into(),
        title: "Transformers Revisited".into(),
        link: Some("https://ex/x1".into()),
        authors: None,
        published: Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap(),
        content: None,
    };
    let admitted = deduper.admit(&db, &candidate).await.unwrap();
    let article_id = admitted.expect("first occurrence is admitted");

    db.upsert_embeddings(&[(article_id, vec![0.1, 0.2, 0.3, 0.4])], 4).await.unwrap();

    let queue = QueueManager::new();
    let scorer = papersorter::scoring::Scorer::new(model_dir.clone());
    scorer.run_once(&db, &queue, false).await.unwrap();

    let broadcast = BroadcastDriver::new(build_dispatcher(notification_config()), 30, 30);
    let report = broadcast.run_once(&db).await.unwrap().expect("lock is free");
    assert_eq!(report.delivered, 1);

    let entries = db.claim_queued(channel.id, 10).await.unwrap();
    assert!(entries.is_empty(), "the entry should have been delivered, not left queued");

    let _ = std::fs::remove_dir_all(&model_dir);
}

#[tokio::test]
async fn scenario_b_threshold_rejection() {
    let (db, _container) = test_db().await;
    let model_dir = std::env::temp_dir().join(format!("papersorter-test-b-{}", uuid_ish()));

    let mock = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&mock).await;

    let model_id = seed_active_model(&db, &model_dir, 0.80, 4).await;
    let channel = seed_channel(&db, model_id, &format!("{}/webhook", mock.uri()), 0.9).await;

    let deduper = Deduper::new(DedupeConfig::default());
    let candidate = CandidateArticle {
        external_id: "x2".into(),
        title: "Below Threshold Paper".into(),
        link: Some("https://ex/x2".into()),
        authors: None,
        published: Utc::now(),
        content: None,
    };
    let article_id = deduper.admit(&db, &candidate).await.unwrap().unwrap();
    db.upsert_embeddings(&[(article_id, vec![0.1, 0.2, 0.3, 0.4])], 4).await.unwrap();

    let queue = QueueManager::new();
    let scorer = papersorter::scoring::Scorer::new(model_dir.clone());
    scorer.run_once(&db, &queue, false).await.unwrap();

    let queued = db.claim_queued(channel.id, 10).await.unwrap();
    assert!(queued.is_empty(), "score below threshold must not enqueue");

    assert_eq!(mock.received_requests().await.unwrap().len(), 0);

    let _ = std::fs::remove_dir_all(&model_dir);
}

#[tokio::test]
async fn scenario_d_deduplication_rejects_fuzzy_title_match() {
    let (db, _container) = test_db().await;
    let deduper = Deduper::new(DedupeConfig::default());

    let a1 = CandidateArticle {
        external_id: "a1".into(),
        title: "Deep Learning for Genomics".into(),
        link: Some("https://ex/a1".into()),
        authors: None,
        published: Utc::now(),
        content: None,
    };
    let a2 = CandidateArticle {
        external_id: "a2-different-id".into(),
        title: "Deep Learning for Genomics".into(),
        link: Some("https://ex/a2".into()),
        authors: None,
        published: Utc::now(),
        content: None,
    };

    let first = deduper.admit(&db, &a1).await.unwrap();
    assert!(first.is_ok());
    let second = deduper.admit(&db, &a2).await.unwrap();
    assert!(second.is_err(), "fuzzy-matching title within the window must be rejected");

    db.record_event(EventSeverity::Info, "candidate rejected: FuzzyTitle", None, None)
        .await
        .unwrap();
    let events = db.recent_events(10).await.unwrap();
    assert!(events.iter().any(|e| e.message.contains("rejected")));
}

#[tokio::test]
async fn scenario_e_retriable_then_successful_delivery() {
    let (db, _container) = test_db().await;
    let model_dir = std::env::temp_dir().join(format!("papersorter-test-e-{}", uuid_ish()));

    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock)
        .await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&mock).await;

    let model_id = seed_active_model(&db, &model_dir, 0.80, 4).await;
    let channel = seed_channel(&db, model_id, &mock.uri(), 0.5).await;

    let deduper = Deduper::new(DedupeConfig::default());
    let candidate = CandidateArticle {
        external_id: "e1".into(),
        title: "Retry Candidate".into(),
        link: Some("https://ex/e1".into()),
        authors: None,
        published: Utc::now(),
        content: None,
    };
    let article_id = deduper.admit(&db, &candidate).await.unwrap().unwrap();
    db.upsert_embeddings(&[(article_id, vec![0.1, 0.2, 0.3, 0.4])], 4).await.unwrap();

    let queue = QueueManager::new();
    let scorer = papersorter::scoring::Scorer::new(model_dir.clone());
    scorer.run_once(&db, &queue, false).await.unwrap();

    let broadcast = BroadcastDriver::new(build_dispatcher(notification_config()), 30, 30);
    let first_tick = broadcast.run_once(&db).await.unwrap().unwrap();
    assert_eq!(first_tick.delivered, 0, "503 must leave the entry queued, not delivered");

    let second_tick = broadcast.run_once(&db).await.unwrap().unwrap();
    assert_eq!(second_tick.delivered, 1, "retry on the next tick must succeed exactly once");

    let _ = channel;
    let _ = std::fs::remove_dir_all(&model_dir);
}

#[tokio::test]
async fn scenario_f_permanent_failure_deactivates_channel() {
    let (db, _container) = test_db().await;
    let model_dir = std::env::temp_dir().join(format!("papersorter-test-f-{}", uuid_ish()));

    let mock = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(404)).mount(&mock).await;

    let model_id = seed_active_model(&db, &model_dir, 0.80, 4).await;
    let channel = seed_channel(&db, model_id, &mock.uri(), 0.5).await;

    let deduper = Deduper::new(DedupeConfig::default());
    let candidate = CandidateArticle {
        external_id: "f1".into(),
        title: "Permanently Failing Delivery".into(),
        link: Some("https://ex/f1".into()),
        authors: None,
        published: Utc::now(),
        content: None,
    };
    let article_id = deduper.admit(&db, &candidate).await.unwrap().unwrap();
    db.upsert_embeddings(&[(article_id, vec![0.1, 0.2, 0.3, 0.4])], 4).await.unwrap();

    let queue = QueueManager::new();
    let scorer = papersorter::scoring::Scorer::new(model_dir.clone());
    scorer.run_once(&db, &queue, false).await.unwrap();

    let broadcast = BroadcastDriver::new(build_dispatcher(notification_config()), 30, 30);
    broadcast.run_once(&db).await.unwrap().unwrap();

    let reloaded = db.get_channel(channel.id).await.unwrap().unwrap();
    assert!(!reloaded.is_active, "a 404 from the webhook must deactivate the channel");

    let queued = db.claim_queued(channel.id, 10).await.unwrap();
    assert!(queued.is_empty(), "an inactive channel's entries are no longer claimable, but must not be marked delivered either");

    let _ = std::fs::remove_dir_all(&model_dir);
}

#[tokio::test]
async fn broadcast_idempotence_never_double_delivers() {
    let (db, _container) = test_db().await;
    let model_dir = std::env::temp_dir().join(format!("papersorter-test-idem-{}", uuid_ish()));

    let mock = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).mount(&mock).await;

    let model_id = seed_active_model(&db, &model_dir, 0.80, 4).await;
    let channel = seed_channel(&db, model_id, &mock.uri(), 0.5).await;

    let deduper = Deduper::new(DedupeConfig::default());
    let candidate = CandidateArticle {
        external_id: "idem1".into(),
        title: "Idempotence Check".into(),
        link: Some("https://ex/idem1".into()),
        authors: None,
        published: Utc::now(),
        content: None,
    };
    let article_id = deduper.admit(&db, &candidate).await.unwrap().unwrap();
    db.upsert_embeddings(&[(article_id, vec![0.1, 0.2, 0.3, 0.4])], 4).await.unwrap();

    let queue = QueueManager::new();
    let scorer = papersorter::scoring::Scorer::new(model_dir.clone());
    scorer.run_once(&db, &queue, false).await.unwrap();
    // Calling enqueue a second time directly must not create a second row.
    let depth_before = queue.queue_depth(&db, channel.id).await.unwrap();
    queue.enqueue(&db, article_id, channel.id).await.unwrap();
    let depth_after = queue.queue_depth(&db, channel.id).await.unwrap();
    assert_eq!(depth_before, depth_after);

    let broadcast = BroadcastDriver::new(build_dispatcher(notification_config()), 30, 30);
    broadcast.run_once(&db).await.unwrap().unwrap();
    broadcast.run_once(&db).await.unwrap().unwrap();

    assert_eq!(mock.received_requests().await.unwrap().len(), 1, "a delivered entry must never be resent");

    let _ = std::fs::remove_dir_all(&model_dir);
}

/// testcontainers needs unique-enough scratch directories per test run;
/// avoids pulling in a UUID dependency just for test isolation.
fn uuid_ish() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64
}
