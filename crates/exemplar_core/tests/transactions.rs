mod common;

use common::{registry, row_count, setup_db, City, Person};
use exemplar_core::{
    CrudOrchestrator, MatchMode, RepoError, Session, SessionOptions, StoreConfig,
    TransactionMode,
};
use std::time::Duration;

#[test]
fn batch_failure_rolls_back_every_item_and_names_the_failing_one() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);

    let batch = [
        Person::named("Ana").with_email("shared@example.com"),
        Person::named("Bia").with_email("shared@example.com"),
        Person::named("Caio").with_email("caio@example.com"),
    ];
    let err = people.insert_all(&mut session, &batch).unwrap_err();

    match err {
        RepoError::BatchAborted { index, cause } => {
            assert_eq!(index, 1);
            assert!(matches!(
                *cause,
                RepoError::ConstraintViolation {
                    entity: Some("Person"),
                    ..
                }
            ));
        }
        other => panic!("expected batch abort, got {other:?}"),
    }
    assert_eq!(row_count(&conn, "person"), 0);
    assert!(!session.is_active());
    assert_eq!(session.pending_writes(), 0);
}

#[test]
fn failed_write_leaves_no_active_transaction_and_session_stays_usable() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);

    let dangling = Person {
        city: Some(City::with_id(77)),
        ..Person::named("Ana")
    };
    let err = people.insert(&mut session, &dangling).unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation { .. }));
    assert!(!session.is_active());

    assert!(people.insert(&mut session, &Person::named("Ana")).unwrap());
    assert_eq!(row_count(&conn, "person"), 1);
}

#[test]
fn batch_update_reports_missing_row_by_index() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);

    let mut ana = people.insert_returning(&mut session, &Person::named("Ana")).unwrap();
    ana.nickname = Some("Aninha".to_string());
    let ghost = Person {
        id: 900,
        ..Person::named("Ghost")
    };
    let err = people
        .update_all(&mut session, &[ana.clone(), ghost])
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::BatchAborted { index: 1, ref cause } if matches!(**cause, RepoError::NotFound { .. })
    ));

    let loaded = people.find_by_id(&mut session, ana.id).unwrap().unwrap();
    assert_eq!(loaded.nickname, None);
}

#[test]
fn guarded_writes_join_a_caller_transaction() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);

    assert!(session.begin().unwrap());
    assert!(!session.begin().unwrap());
    people.insert(&mut session, &Person::named("Ana")).unwrap();
    people.insert(&mut session, &Person::named("Bia")).unwrap();
    assert!(session.is_active());

    let visible = people
        .find_list(&mut session, &Person::default(), MatchMode::Pattern)
        .unwrap();
    assert_eq!(visible.len(), 2);

    session.rollback().unwrap();
    assert_eq!(row_count(&conn, "person"), 0);

    session.begin().unwrap();
    people.insert(&mut session, &Person::named("Caio")).unwrap();
    session.commit().unwrap();
    assert_eq!(row_count(&conn, "person"), 1);
}

#[test]
fn failure_inside_caller_transaction_rolls_back_earlier_writes() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);

    session.begin().unwrap();
    people
        .insert(&mut session, &Person::named("Ana").with_email("a@example.com"))
        .unwrap();
    let err = people
        .insert(&mut session, &Person::named("Bia").with_email("a@example.com"))
        .unwrap_err();
    assert!(matches!(err, RepoError::ConstraintViolation { .. }));
    assert!(!session.is_active());
    assert!(matches!(
        session.commit().unwrap_err(),
        RepoError::NoActiveTransaction
    ));
    assert_eq!(row_count(&conn, "person"), 0);
}

#[test]
fn closed_session_refuses_writes_and_reads() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);
    session.close().unwrap();

    let err = people.insert(&mut session, &Person::named("Ana")).unwrap_err();
    assert!(matches!(err, RepoError::NoActiveTransaction));
    let err = people
        .find_list(&mut session, &Person::default(), MatchMode::Pattern)
        .unwrap_err();
    assert!(matches!(err, RepoError::SessionClosed));
    assert_eq!(row_count(&conn, "person"), 0);
}

#[test]
fn foreign_unit_of_work_blocks_writes_and_reads() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();

    conn.execute_batch("BEGIN;").unwrap();
    {
        let mut session = Session::new(&conn);
        assert!(!session.is_live());
        let err = people.insert(&mut session, &Person::named("Ana")).unwrap_err();
        assert!(matches!(err, RepoError::NoActiveTransaction));
        let err = people.count(&mut session, &Person::default()).unwrap_err();
        assert!(matches!(err, RepoError::ForeignTransaction));
    }
    conn.execute_batch("ROLLBACK;").unwrap();
}

#[test]
fn cancelled_session_fails_before_touching_storage() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);

    let handle = session.cancel_handle();
    handle.cancel();
    assert!(handle.is_cancelled());

    let err = people.insert(&mut session, &Person::named("Ana")).unwrap_err();
    assert!(matches!(err, RepoError::Cancelled));
    assert!(!session.is_active());
    let err = people.count(&mut session, &Person::default()).unwrap_err();
    assert!(matches!(err, RepoError::Cancelled));
    assert_eq!(row_count(&conn, "person"), 0);
}

#[test]
fn expired_deadline_surfaces_as_deadline_exceeded() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let options = SessionOptions::default().with_timeout(Duration::ZERO);
    let mut session = Session::with_options(&conn, options);

    let err = people.insert(&mut session, &Person::named("Ana")).unwrap_err();
    assert!(matches!(err, RepoError::DeadlineExceeded));
    assert!(!session.is_active());
}

#[test]
fn session_options_follow_store_config() {
    let config = StoreConfig {
        transaction_mode: TransactionMode::Deferred,
        ..StoreConfig::default()
    };
    let options = SessionOptions::from(&config);
    assert_eq!(options.transaction_mode, TransactionMode::Deferred);
    assert!(options.deadline.is_none());

    let conn = setup_db();
    let registry = registry();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::with_options(&conn, options);
    assert!(people.insert(&mut session, &Person::named("Ana")).unwrap());
    assert_eq!(row_count(&conn, "person"), 1);
}

#[test]
fn dropping_a_session_rolls_back_its_open_transaction() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    {
        let mut session = Session::new(&conn);
        session.begin().unwrap();
        people.insert(&mut session, &Person::named("Ana")).unwrap();
    }
    assert!(conn.is_autocommit());
    assert_eq!(row_count(&conn, "person"), 0);
}
