use smartnote_core::ai::mock::StubGenerationBackend;
use smartnote_core::repo::note_repo::{RepoError, RepoResult};
use smartnote_core::repo::regeneration_repo::SqliteRegenerationRepository;
use smartnote_core::repo::usage_repo::{SqliteUsageRepository, UsageRepository, UsageTotals};
use smartnote_core::{
    GenerationClient, GenerationService, GenerationSettings, Note, NoteRepository,
    RegenerationLimiter, SharedConnection, SqliteNoteRepository, StaticIdentity, UsageOperation,
    UsageRecord, UsageTracker, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn record(user_id: UserId, operation: UsageOperation, input: u32, output: u32) -> UsageRecord {
    UsageRecord {
        user_id,
        note_id: None,
        operation,
        input_tokens: input,
        output_tokens: output,
        total_tokens: input + output,
        cost_estimate: 0.001,
        model: "gemini-2.0-flash".to_string(),
        created_at: chrono::Utc::now().timestamp_millis(),
    }
}

#[tokio::test]
async fn background_records_are_visible_after_flush() {
    let conn = SharedConnection::in_memory().unwrap();
    let tracker = UsageTracker::new(Arc::new(SqliteUsageRepository::new(conn)));
    let (user, other) = (Uuid::new_v4(), Uuid::new_v4());

    tracker.record_in_background(record(user, UsageOperation::Summary, 100, 20));
    tracker.record_in_background(record(user, UsageOperation::Tags, 40, 10));
    tracker.record_in_background(record(other, UsageOperation::Summary, 7, 7));
    tracker.flush().await;

    let totals = tracker.today_totals(user).unwrap();
    assert_eq!(totals.requests, 2);
    assert_eq!(totals.input_tokens, 140);
    assert_eq!(totals.output_tokens, 30);
    assert_eq!(totals.total_tokens, 170);
    assert!((totals.cost_estimate - 0.002).abs() < 1e-9);

    assert_eq!(tracker.recent(user, 1).unwrap().len(), 1);
    assert_eq!(tracker.recent(other, 10).unwrap().len(), 1);

    // The tracker stays usable after a flush.
    tracker.record_in_background(record(user, UsageOperation::Regeneration, 1, 1));
    tracker.flush().await;
    assert_eq!(tracker.today_totals(user).unwrap().requests, 3);
}

struct BrokenUsageRepository;

impl UsageRepository for BrokenUsageRepository {
    fn insert_usage(&self, _record: &UsageRecord) -> RepoResult<()> {
        Err(RepoError::InvalidData("disk full".to_string()))
    }

    fn list_usage(&self, _user_id: UserId, _limit: u32) -> RepoResult<Vec<UsageRecord>> {
        Ok(Vec::new())
    }

    fn totals_since(&self, _user_id: UserId, _since_ms: i64) -> RepoResult<UsageTotals> {
        Ok(UsageTotals::default())
    }
}

#[tokio::test]
async fn failed_usage_write_is_swallowed() {
    let tracker = UsageTracker::new(Arc::new(BrokenUsageRepository));
    tracker.record_in_background(record(Uuid::new_v4(), UsageOperation::Summary, 1, 1));
    tracker.flush().await;
    assert!(tracker.recent(Uuid::new_v4(), 10).unwrap().is_empty());
}

#[tokio::test]
async fn usage_write_failure_does_not_fail_generation() {
    let conn = SharedConnection::in_memory().unwrap();
    let owner = Uuid::new_v4();
    let notes = Arc::new(SqliteNoteRepository::new(conn.clone()));
    let note = Note::new(
        owner,
        "Standup",
        "Discussed the release blockers, the migration plan and who owns the rollout checklist.",
    );
    notes.create_note(&note).unwrap();

    let service = GenerationService::new(
        notes.clone(),
        Arc::new(StaticIdentity::user(owner)),
        GenerationClient::new(Arc::new(StubGenerationBackend::text("Release sync."))),
        RegenerationLimiter::new(Arc::new(SqliteRegenerationRepository::new(conn))),
        UsageTracker::new(Arc::new(BrokenUsageRepository)),
        GenerationSettings::default(),
    );

    let summary = service.generate_summary(&note.id.to_string()).await.unwrap();
    assert_eq!(summary.content, "Release sync.");
    service.usage().flush().await;
    assert_eq!(
        notes.get_summary(note.id).unwrap().unwrap().content,
        "Release sync."
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_flushes_all_return() {
    let conn = SharedConnection::in_memory().unwrap();
    let tracker = UsageTracker::new(Arc::new(SqliteUsageRepository::new(conn)));
    let user = Uuid::new_v4();

    for _ in 0..3 {
        for _ in 0..8 {
            tracker.record_in_background(record(user, UsageOperation::Tags, 2, 2));
        }
        let flushed = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(tracker.flush(), tracker.flush(), tracker.flush());
        })
        .await;
        assert!(flushed.is_ok(), "a concurrent flush never returned");
    }
    assert_eq!(tracker.today_totals(user).unwrap().requests, 24);
}
