//! Store integration tests.
//!
//! These require a running Redis and are ignored by default:
//! `cargo test -p inkpost-store -- --ignored`

use inkpost_models::{JobKind, JobState, JobStatus, PayoutMethod, PayoutRequest, VideoGeneration, VideoKind};
use inkpost_store::{JobRepository, PayoutRepository, RedisStore, StoreError};

fn store() -> RedisStore {
    dotenvy::dotenv().ok();
    RedisStore::from_env().expect("Failed to create store")
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_roundtrip_and_transition() {
    let repo = JobRepository::new(store());

    let job = JobStatus::new(JobKind::VideoGeneration, "render:normal").with_user("it-user");
    let id = job.job_id.clone();
    repo.create(&job).await.expect("Failed to create job");

    let loaded = repo.get(&id).await.expect("get failed").expect("job missing");
    assert_eq!(loaded.status, JobState::Pending);

    let started = repo
        .transition(&id, |j| j.mark_started())
        .await
        .expect("start failed");
    assert_eq!(started.status, JobState::Processing);

    // A second start must observe the new pre-state and be rejected as a
    // transition error, not silently applied.
    let err = repo.transition(&id, |j| j.mark_started()).await.unwrap_err();
    assert!(matches!(err, StoreError::Transition(_)));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_cas_conflict_detected() {
    let store = store();
    let repo = JobRepository::new(store.clone());

    let job = JobStatus::new(JobKind::SourceImport, "import:normal");
    let id = job.job_id.clone();
    repo.create(&job).await.expect("Failed to create job");

    // Simulate a racing writer: hold a stale copy while another writer
    // advances the record, then try to persist against the stale pre-state.
    let mut stale = repo.get(&id).await.unwrap().unwrap();
    assert_eq!(stale.status, JobState::Pending);

    repo.transition(&id, |j| j.mark_started()).await.unwrap();

    stale.mark_failed("stale writer").unwrap();
    let key = store.key(&format!("job:{}", id));
    let err = store
        .cas_update(&key, "pending", stale.status.as_str(), &stale)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { .. }));

    // The racing writer's state survives.
    let current = repo.get(&id).await.unwrap().unwrap();
    assert_eq!(current.status, JobState::Processing);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_payout_approval_is_guarded() {
    let repo = PayoutRepository::new(store());

    let request = PayoutRequest::new("it-creator", 50_00, PayoutMethod::Paypal);
    let id = request.id.clone();
    repo.create(&request).await.expect("Failed to create payout");

    let approved = repo
        .transition(&id, |p| p.approve("tx-it-1", "it-admin"))
        .await
        .expect("approve failed");
    assert_eq!(approved.transaction_reference.as_deref(), Some("tx-it-1"));

    // Approving again must fail and leave the record unchanged.
    let err = repo
        .transition(&id, |p| p.approve("tx-it-2", "it-admin"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transition(_)));

    let reloaded = repo.get(&id).await.unwrap().unwrap();
    assert_eq!(reloaded.transaction_reference.as_deref(), Some("tx-it-1"));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_scheduled_generation_shows_up_as_due() {
    use inkpost_store::GenerationRepository;

    let repo = GenerationRepository::new(store());

    let mut gen = VideoGeneration::new("it-user", "post-42", VideoKind::Reel);
    gen.schedule_for(chrono::Utc::now() - chrono::Duration::minutes(1))
        .unwrap();
    let id = gen.id.clone();
    repo.create(&gen).await.expect("Failed to create generation");

    let due = repo
        .due_scheduled(chrono::Utc::now(), 10)
        .await
        .expect("due query failed");
    assert!(due.iter().any(|g| g.id == id));

    let released = repo
        .transition(&id, |g| g.make_due())
        .await
        .expect("release failed");
    assert_eq!(released.status.as_str(), "queued");

    let due_after = repo.due_scheduled(chrono::Utc::now(), 10).await.unwrap();
    assert!(!due_after.iter().any(|g| g.id == id));
}
