//! Integration tests for commit, restore and change notification.

use std::sync::{Arc, Mutex};
use std::thread;

use dse_store::{
    CancellationToken, Change, DiffEntry, ModelListener, ModelStore, StoreError, Symbol, Tuple,
    Version,
};

// ============================================================================
// Fixtures
// ============================================================================

struct Schema {
    person: Symbol<bool>,
    friend: Symbol<bool>,
    age: Symbol<u32>,
}

fn schema() -> (ModelStore, Schema) {
    let schema = Schema {
        person: Symbol::relation("Person", 1),
        friend: Symbol::relation("friend", 2),
        age: Symbol::new("age", 1, 0u32),
    };
    let store = ModelStore::builder()
        .symbol(&schema.person)
        .symbol(&schema.friend)
        .symbol(&schema.age)
        .build()
        .unwrap();
    (store, schema)
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    BeforeCommit,
    AfterCommit(Version),
    BeforeRestore(Version),
    AfterRestore(Version),
    Changed(Change),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl ModelListener for Recorder {
    fn before_commit(&mut self) {
        self.0.lock().unwrap().push(Event::BeforeCommit);
    }

    fn after_commit(&mut self, version: Version) {
        self.0.lock().unwrap().push(Event::AfterCommit(version));
    }

    fn before_restore(&mut self, version: Version) {
        self.0.lock().unwrap().push(Event::BeforeRestore(version));
    }

    fn after_restore(&mut self, version: Version) {
        self.0.lock().unwrap().push(Event::AfterRestore(version));
    }

    fn changed(&mut self, change: &Change) {
        self.0.lock().unwrap().push(Event::Changed(change.clone()));
    }
}

// ============================================================================
// Commit / Restore
// ============================================================================

#[test]
fn test_restore_returns_committed_content() -> anyhow::Result<()> {
    let (store, schema) = schema();
    let mut model = store.create_model();
    let person = model.interpretation(&schema.person)?;
    let age = model.interpretation(&schema.age)?;

    model.put(&person, Tuple::of1(0), true)?;
    model.put(&age, Tuple::of1(0), 30)?;
    let first = model.commit()?;

    model.put(&person, Tuple::of1(1), true)?;
    model.put(&age, Tuple::of1(0), 31)?;
    let second = model.commit()?;
    assert_ne!(first, second);

    model.restore(first)?;
    assert_eq!(model.state(), first);
    assert!(model.get(&person, &Tuple::of1(0))?);
    assert!(!model.get(&person, &Tuple::of1(1))?);
    assert_eq!(model.get(&age, &Tuple::of1(0))?, 30);

    model.restore(second)?;
    assert!(model.get(&person, &Tuple::of1(1))?);
    assert_eq!(model.get(&age, &Tuple::of1(0))?, 31);
    Ok(())
}

#[test]
fn test_restore_discards_uncommitted_writes() -> anyhow::Result<()> {
    let (store, schema) = schema();
    let mut model = store.create_model();
    let person = model.interpretation(&schema.person)?;
    let root = model.commit()?;

    model.put(&person, Tuple::of1(5), true)?;
    assert!(model.has_uncommitted_changes());
    model.restore(root)?;

    assert!(!model.has_uncommitted_changes());
    assert_eq!(model.size(&person)?, 0);
    assert_eq!(model.commit()?, root);
    Ok(())
}

#[test]
fn test_commit_without_changes_reuses_version() {
    let (store, schema) = schema();
    let mut model = store.create_model();
    let friend = model.interpretation(&schema.friend).unwrap();

    let initial = model.commit().unwrap();
    assert_eq!(initial, store.initial_version());
    assert_eq!(store.version_count(), 1);

    model.put(&friend, Tuple::of2(0, 1), true).unwrap();
    let next = model.commit().unwrap();
    assert_eq!(model.commit().unwrap(), next);
    assert_eq!(store.version_count(), 2);
}

#[test]
fn test_restore_unknown_version_fails() {
    let (store, _) = schema();
    let mut model = store.create_model();
    let (_, foreign) = schema();
    assert!(matches!(
        model.interpretation(&foreign.person),
        Err(StoreError::UnknownSymbol { .. })
    ));

    let bogus: Version = serde_json::from_str("99").unwrap();
    assert_eq!(
        model.restore(bogus).unwrap_err(),
        StoreError::UnknownVersion { version: bogus }
    );
    assert_eq!(model.state(), store.initial_version());
}

#[test]
fn test_diff_cursor_between_versions() -> anyhow::Result<()> {
    let (store, schema) = schema();
    let mut model = store.create_model();
    let age = model.interpretation(&schema.age)?;

    model.put(&age, Tuple::of1(0), 10)?;
    model.put(&age, Tuple::of1(1), 20)?;
    let from = model.commit()?;
    model.put(&age, Tuple::of1(0), 0)?;
    model.put(&age, Tuple::of1(1), 21)?;
    let to = model.commit()?;

    let diff = model.diff_cursor(&age, from, to)?;
    assert_eq!(
        diff,
        vec![
            DiffEntry {
                key: Tuple::of1(0),
                from_value: 10,
                to_value: 0
            },
            DiffEntry {
                key: Tuple::of1(1),
                from_value: 20,
                to_value: 21
            },
        ]
    );
    assert!(model.diff_cursor(&age, to, to)?.is_empty());
    Ok(())
}

#[test]
fn test_cursor_skips_default_values() -> anyhow::Result<()> {
    let (store, schema) = schema();
    let mut model = store.create_model();
    let friend = model.interpretation(&schema.friend)?;

    model.put(&friend, Tuple::of2(1, 0), true)?;
    model.put(&friend, Tuple::of2(0, 1), true)?;
    model.put(&friend, Tuple::of2(0, 2), true)?;
    model.put(&friend, Tuple::of2(0, 2), false)?;

    let keys: Vec<Tuple> = model.cursor(&friend)?.map(|(key, _)| key.clone()).collect();
    assert_eq!(keys, vec![Tuple::of2(0, 1), Tuple::of2(1, 0)]);
    Ok(())
}

// ============================================================================
// Listeners
// ============================================================================

#[test]
fn test_listener_sees_writes_and_restores() -> anyhow::Result<()> {
    let (store, schema) = schema();
    let mut model = store.create_model();
    let person = model.interpretation(&schema.person)?;
    let recorder = Recorder::default();
    model.add_listener(recorder.clone());

    let root = model.commit()?;
    model.put(&person, Tuple::of1(3), true)?;
    let child = model.commit()?;
    model.restore(root)?;

    let change = |restoring| Change {
        symbol: schema.person.key(),
        key: Tuple::of1(3),
        restoring,
    };
    assert_eq!(
        recorder.take(),
        vec![
            Event::BeforeCommit,
            Event::AfterCommit(root),
            Event::Changed(change(false)),
            Event::BeforeCommit,
            Event::AfterCommit(child),
            Event::BeforeRestore(root),
            Event::Changed(change(true)),
            Event::AfterRestore(root),
        ]
    );
    Ok(())
}

#[test]
fn test_restore_to_same_content_is_silent() -> anyhow::Result<()> {
    let (store, schema) = schema();
    let mut model = store.create_model();
    let person = model.interpretation(&schema.person)?;
    model.put(&person, Tuple::of1(0), true)?;
    let version = model.commit()?;
    let count = model.modification_count();

    let recorder = Recorder::default();
    model.add_listener(recorder.clone());
    model.restore(version)?;

    assert_eq!(
        recorder.take(),
        vec![Event::BeforeRestore(version), Event::AfterRestore(version)]
    );
    assert_eq!(model.modification_count(), count);
    Ok(())
}

// ============================================================================
// Sharing and Cancellation
// ============================================================================

#[test]
fn test_models_on_threads_share_versions() {
    let (store, schema) = schema();

    let handles: Vec<_> = (0..4u32)
        .map(|i| {
            let store = store.clone();
            let person = schema.person.clone();
            thread::spawn(move || {
                let mut model = store.create_model();
                let interpretation = model.interpretation(&person).unwrap();
                model.put(&interpretation, Tuple::of1(i), true).unwrap();
                (i, model.commit().unwrap())
            })
        })
        .collect();
    let committed: Vec<(u32, Version)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(store.version_count(), 5);
    let mut model = store.create_model();
    let person = model.interpretation(&schema.person).unwrap();
    for (i, version) in committed {
        model.restore(version).unwrap();
        assert_eq!(model.size(&person).unwrap(), 1);
        assert!(model.get(&person, &Tuple::of1(i)).unwrap());
    }
}

#[test]
fn test_create_model_at_version() -> anyhow::Result<()> {
    let (store, schema) = schema();
    let mut writer = store.create_model();
    let person = writer.interpretation(&schema.person)?;
    writer.put(&person, Tuple::of1(7), true)?;
    let version = writer.commit()?;

    let reader = store.create_model_at(version)?;
    assert_eq!(reader.state(), version);
    assert!(reader.get(&person, &Tuple::of1(7))?);
    Ok(())
}

#[test]
fn test_cancelled_store_rejects_commit_and_restore() {
    let token = CancellationToken::new();
    let person = Symbol::relation("Person", 1);
    let store = ModelStore::builder()
        .symbol(&person)
        .cancellation_token(token.clone())
        .build()
        .unwrap();
    let mut model = store.create_model();
    let interpretation = model.interpretation(&person).unwrap();
    model.put(&interpretation, Tuple::of1(0), true).unwrap();

    token.cancel();
    assert_eq!(model.commit().unwrap_err(), StoreError::Cancelled);
    assert!(model
        .restore(store.initial_version())
        .unwrap_err()
        .is_cancelled());
    assert!(model.has_uncommitted_changes());
}
