use smartnote_core::model::note::TagValidationError;
use smartnote_core::{
    NoteRepository, NoteService, NoteServiceError, SharedConnection, SqliteNoteRepository,
    StaticIdentity,
};
use std::sync::Arc;
use uuid::Uuid;

fn service_for(conn: &SharedConnection, identity: StaticIdentity) -> NoteService {
    NoteService::new(
        Arc::new(SqliteNoteRepository::new(conn.clone())),
        Arc::new(identity),
    )
}

#[test]
fn create_and_read_back_owned_note() {
    let conn = SharedConnection::in_memory().unwrap();
    let owner = Uuid::new_v4();
    let service = service_for(&conn, StaticIdentity::user(owner));

    let created = service.create_note("Title", "Body text").unwrap();
    assert_eq!(created.owner_id, owner);
    assert!(created.is_owned_by(owner));

    let loaded = service.get_note(created.id).unwrap();
    assert_eq!(loaded, created);
    assert!(service.get_summary(created.id).unwrap().is_none());
    assert!(service.list_tags(created.id).unwrap().is_empty());
}

#[test]
fn other_users_cannot_see_or_tag_the_note() {
    let conn = SharedConnection::in_memory().unwrap();
    let owner_service = service_for(&conn, StaticIdentity::user(Uuid::new_v4()));
    let intruder = service_for(&conn, StaticIdentity::user(Uuid::new_v4()));
    let note = owner_service.create_note("Private", "secret body").unwrap();

    assert!(matches!(
        intruder.get_note(note.id),
        Err(NoteServiceError::NoteNotFound(id)) if id == note.id
    ));
    assert!(matches!(
        intruder.add_tag(note.id, "sneaky"),
        Err(NoteServiceError::NoteNotFound(_))
    ));
    assert!(owner_service.list_tags(note.id).unwrap().is_empty());
}

#[test]
fn anonymous_caller_is_rejected() {
    let conn = SharedConnection::in_memory().unwrap();
    let service = service_for(&conn, StaticIdentity::anonymous());
    assert!(matches!(
        service.create_note("t", "b"),
        Err(NoteServiceError::Unauthenticated)
    ));
}

#[test]
fn manual_tags_are_capped_and_deduplicated() {
    let conn = SharedConnection::in_memory().unwrap();
    let service = service_for(&conn, StaticIdentity::user(Uuid::new_v4()));
    let note = service.create_note("Tags", "body").unwrap();

    for tag in ["one", "two", "three", "four", "five", "six"] {
        service.add_tag(note.id, tag).unwrap();
    }
    let tags = service.add_tag(note.id, "ONE").unwrap();
    assert_eq!(tags, vec!["one", "two", "three", "four", "five", "six"]);

    let err = service.add_tag(note.id, "seven").unwrap_err();
    assert!(matches!(
        err,
        NoteServiceError::InvalidTag(TagValidationError::TooMany { limit: 6 })
    ));

    let err = service.add_tag(note.id, &"x".repeat(51)).unwrap_err();
    assert!(matches!(
        err,
        NoteServiceError::InvalidTag(TagValidationError::TooLong { chars: 51 })
    ));
}

#[test]
fn removing_a_tag_keeps_remaining_order_and_frees_a_slot() {
    let conn = SharedConnection::in_memory().unwrap();
    let service = service_for(&conn, StaticIdentity::user(Uuid::new_v4()));
    let note = service.create_note("Tags", "body").unwrap();
    for tag in ["a", "b", "c", "d", "e", "f"] {
        service.add_tag(note.id, tag).unwrap();
    }

    let tags = service.remove_tag(note.id, "C").unwrap();
    assert_eq!(tags, vec!["a", "b", "d", "e", "f"]);
    let tags = service.remove_tag(note.id, "missing").unwrap();
    assert_eq!(tags.len(), 5);

    let tags = service.add_tag(note.id, "g").unwrap();
    assert_eq!(tags, vec!["a", "b", "d", "e", "f", "g"]);
}

#[test]
fn replace_tags_is_wholesale_and_validated() {
    let conn = SharedConnection::in_memory().unwrap();
    let repo = SqliteNoteRepository::new(conn.clone());
    let service = service_for(&conn, StaticIdentity::user(Uuid::new_v4()));
    let note = service.create_note("Tags", "body").unwrap();

    let stored = repo
        .replace_tags(note.id, &["x".to_string(), " y ".to_string()])
        .unwrap();
    assert_eq!(stored, vec!["x", "y"]);
    let stored = repo.replace_tags(note.id, &["z".to_string()]).unwrap();
    assert_eq!(stored, vec!["z"]);
    assert_eq!(repo.list_note_tags(note.id).unwrap(), vec!["z"]);

    let seven: Vec<String> = (0..7).map(|i| format!("tag{i}")).collect();
    assert!(repo.replace_tags(note.id, &seven).is_err());
    assert!(repo.replace_tags(Uuid::new_v4(), &["z".to_string()]).is_err());
    assert_eq!(repo.list_note_tags(note.id).unwrap(), vec!["z"]);
}
