use smartnote_core::ai::mock::{StubGenerationBackend, StubReply};
use smartnote_core::{
    ErrorKind, GenerationService, GenerationServiceError, GenerationSettings, Note,
    NoteRepository, SharedConnection, SqliteNoteRepository, StaticIdentity, UsageOperation,
    UserId,
};
use std::sync::Arc;
use uuid::Uuid;

const BODY: &str = "오늘은 러스트로 노트 앱의 AI 태그 기능을 개발했다. \
                    테스트 자동화와 비동기 처리, 그리고 사용량 추적까지 정리했다.";

struct Harness {
    conn: SharedConnection,
    notes: SqliteNoteRepository,
    backend: Arc<StubGenerationBackend>,
    service: GenerationService,
    owner: UserId,
}

fn harness(backend: StubGenerationBackend) -> Harness {
    let conn = SharedConnection::in_memory().unwrap();
    let backend = Arc::new(backend);
    let owner = Uuid::new_v4();
    let service = GenerationService::with_sqlite(
        conn.clone(),
        Arc::new(StaticIdentity::user(owner)),
        backend.clone(),
        GenerationSettings::default(),
    );
    Harness {
        notes: SqliteNoteRepository::new(conn.clone()),
        conn,
        backend,
        service,
        owner,
    }
}

fn insert_note(h: &Harness) -> Note {
    let note = Note::new(h.owner, "개발 일지", BODY);
    h.notes.create_note(&note).unwrap();
    note
}

fn tag_rows(conn: &SharedConnection) -> i64 {
    conn.lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM note_tags;", [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn seven_suggested_tags_store_first_six_in_order() {
    let h = harness(StubGenerationBackend::text(
        "개발, 테스트, AI, 태그, 자동화, 보너스, 추가",
    ));
    let note = insert_note(&h);

    let tags = h.service.generate_tags(&note.id.to_string()).await.unwrap();
    assert_eq!(tags.note_id, note.id);
    assert_eq!(
        tags.tags,
        vec!["개발", "테스트", "AI", "태그", "자동화", "보너스"]
    );
    assert_eq!(h.notes.list_note_tags(note.id).unwrap(), tags.tags);

    h.service.usage().flush().await;
    let usage = h.service.usage().recent(h.owner, 10).unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].operation, UsageOperation::Tags);
}

#[tokio::test]
async fn stored_tags_respect_count_and_length_limits() {
    let long = "긴".repeat(51);
    let h = harness(StubGenerationBackend::text(format!(
        "- one\n- two\n- {long}\n- three\n- four\n- five\n- six\n- seven\n- eight"
    )));
    let note = insert_note(&h);

    let tags = h.service.generate_tags(&note.id.to_string()).await.unwrap();
    assert_eq!(tags.tags.len(), 6);
    assert!(tags.tags.iter().all(|tag| tag.chars().count() <= 50));
    assert!(!tags.tags.contains(&long));
    assert_eq!(tags.tags[5], "six");
}

#[tokio::test]
async fn regeneration_replaces_the_whole_tag_set() {
    let h = harness(StubGenerationBackend::text("unused"));
    h.backend
        .push_reply(StubReply::Text("alpha, beta, gamma".to_string()));
    h.backend.push_reply(StubReply::Text("delta, epsilon".to_string()));
    let note = insert_note(&h);

    h.service.generate_tags(&note.id.to_string()).await.unwrap();
    h.service.usage().flush().await;
    let regenerated = h
        .service
        .regenerate_tags(&note.id.to_string())
        .await
        .unwrap();

    assert_eq!(regenerated.result.tags, vec!["delta", "epsilon"]);
    assert_eq!(regenerated.quota.current_count, 1);
    assert_eq!(tag_rows(&h.conn), 2);

    h.service.usage().flush().await;
    let operations: Vec<_> = h
        .service
        .usage()
        .recent(h.owner, 10)
        .unwrap()
        .into_iter()
        .map(|record| record.operation)
        .collect();
    assert_eq!(
        operations,
        vec![UsageOperation::Regeneration, UsageOperation::Tags]
    );
}

#[tokio::test]
async fn output_without_usable_tags_fails_and_keeps_existing_tags() {
    let h = harness(StubGenerationBackend::text("unused"));
    h.backend.push_reply(StubReply::Text("rust, sqlite".to_string()));
    h.backend.push_reply(StubReply::Text(" , - , \"\" ".to_string()));
    let note = insert_note(&h);

    h.service.generate_tags(&note.id.to_string()).await.unwrap();
    let err = h
        .service
        .generate_tags(&note.id.to_string())
        .await
        .unwrap_err();

    let classified = err.classified().unwrap();
    assert_eq!(classified.kind, ErrorKind::RemoteService);
    assert!(classified.retryable);
    assert_eq!(
        h.notes.list_note_tags(note.id).unwrap(),
        vec!["rust", "sqlite"]
    );
}

#[tokio::test]
async fn preview_suggests_tags_without_persisting_or_counting() {
    let h = harness(StubGenerationBackend::text("draft, ideas, rust"));

    let tags = h.service.preview_tags(BODY).await.unwrap();
    assert_eq!(tags, vec!["draft", "ideas", "rust"]);
    assert_eq!(tag_rows(&h.conn), 0);

    h.service.usage().flush().await;
    assert!(h.service.usage().recent(h.owner, 10).unwrap().is_empty());
    let status = h
        .service
        .regeneration_status(smartnote_core::OperationType::Tags)
        .unwrap();
    assert_eq!(status.current_count, 0);
}

#[tokio::test]
async fn preview_rejects_short_content() {
    let h = harness(StubGenerationBackend::text("draft"));
    let err = h.service.preview_tags("too short").await.unwrap_err();
    assert!(matches!(
        err,
        GenerationServiceError::ContentTooShort {
            actual_chars: 9,
            ..
        }
    ));
    assert_eq!(h.backend.calls(), 0);
}
