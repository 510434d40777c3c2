use std::path::PathBuf;

use tessera_vfs::{Change, Error, WatchMode};

use crate::harness::{created, deleted, engine, modified, watched, Log};

#[test]
fn removing_one_of_two_callbacks_keeps_the_other() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 1);

    let first = engine.on_change("/w/a.txt", log.callback("first")).unwrap();
    engine.on_change("/w/a.txt", log.callback("second")).unwrap();
    assert!(engine.remove_on_change("/w/a.txt", first));
    assert!(!engine.remove_on_change("/w/a.txt", first));

    mtimes.set("/w/a.txt", 2);
    engine.dispatch(&[modified("/w/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("second", PathBuf::from("/w/a.txt"), Change::Changed)]
    );
    assert_eq!(
        watched(&engine),
        vec![(PathBuf::from("/w"), WatchMode::NonRecursive)]
    );
}

#[test]
fn removing_the_last_callback_disposes_the_native_watch() {
    let (mut engine, _mtimes) = engine();
    let log = Log::default();

    let id = engine.on_change("/w/a.txt", log.callback("a")).unwrap();
    assert_eq!(
        watched(&engine),
        vec![(PathBuf::from("/w"), WatchMode::NonRecursive)]
    );

    assert!(engine.remove_on_change("/w/a.txt", id));
    assert!(watched(&engine).is_empty());
    assert_eq!(engine.watcher().unwatch_calls(), &[PathBuf::from("/w")]);
    assert_eq!(engine.subscription_count(), 0);

    engine.dispatch(&[modified("/w/a.txt"), deleted("/w/a.txt")]);
    assert!(log.take().is_empty());
}

#[test]
fn directory_watch_survives_while_any_registry_in_it_remains() {
    let (mut engine, _mtimes) = engine();
    let log = Log::default();

    let file = engine.on_change("/w/a.txt", log.callback("file")).unwrap();
    let glob = engine.on_change("/w/*.log", log.callback("glob")).unwrap();
    assert_eq!(engine.watcher().watch_calls().len(), 1);

    assert!(engine.remove_on_change("/w/a.txt", file));
    assert_eq!(
        watched(&engine),
        vec![(PathBuf::from("/w"), WatchMode::NonRecursive)]
    );

    assert!(engine.remove_on_change("/w/*.log", glob));
    assert!(watched(&engine).is_empty());
}

#[test]
fn delete_then_create_with_same_mtime_is_one_rename() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 10);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    mtimes.rename("/w/a.txt", "/w/b.txt");
    engine.dispatch(&[deleted("/w/a.txt"), created("/w/b.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/b.txt"), Change::Renamed)]
    );

    // The callback now follows the new path.
    mtimes.set("/w/b.txt", 11);
    engine.dispatch(&[modified("/w/b.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/b.txt"), Change::Changed)]
    );
    engine.dispatch(&[deleted("/w/a.txt")]);
    assert!(log.take().is_empty());
}

#[test]
fn rename_is_correlated_when_create_arrives_first() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 10);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    mtimes.rename("/w/a.txt", "/w/b.txt");
    engine.dispatch(&[created("/w/b.txt"), deleted("/w/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/b.txt"), Change::Renamed)]
    );
}

#[test]
fn rename_into_another_directory_moves_the_native_watch() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 10);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    mtimes.rename("/w/a.txt", "/x/a.txt");
    engine.dispatch(&[deleted("/w/a.txt"), created("/x/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/x/a.txt"), Change::Renamed)]
    );
    assert_eq!(
        watched(&engine),
        vec![(PathBuf::from("/x"), WatchMode::NonRecursive)]
    );
}

#[test]
fn creation_without_a_matching_mtime_is_a_create() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    engine.on_change("/w/new.txt", log.callback("new")).unwrap();

    mtimes.set("/w/new.txt", 5);
    engine.dispatch(&[created("/w/new.txt")]);
    assert_eq!(
        log.take(),
        vec![("new", PathBuf::from("/w/new.txt"), Change::Created)]
    );

    // The creation recorded the mtime, so a change notification with the same mtime is noise.
    engine.dispatch(&[modified("/w/new.txt")]);
    assert!(log.take().is_empty());
}

#[test]
fn deletion_without_a_rename_fires_deleted() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 3);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    mtimes.remove("/w/a.txt");
    engine.dispatch(&[deleted("/w/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/a.txt"), Change::Deleted)]
    );
}

#[test]
fn unchanged_mtime_suppresses_changed() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 1);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    engine.dispatch(&[modified("/w/a.txt")]);
    assert!(log.take().is_empty());

    mtimes.set("/w/a.txt", 2);
    engine.dispatch(&[modified("/w/a.txt")]);
    assert_eq!(log.len(), 1);
}

#[test]
fn unreadable_mtime_still_fires_changed() {
    let (mut engine, _mtimes) = engine();
    let log = Log::default();
    engine.on_change("/w/gone.txt", log.callback("gone")).unwrap();

    engine.dispatch(&[modified("/w/gone.txt")]);
    assert_eq!(
        log.take(),
        vec![("gone", PathBuf::from("/w/gone.txt"), Change::Changed)]
    );
}

#[test]
fn duplicate_changes_in_a_burst_fire_once() {
    let (mut engine, _mtimes) = engine();
    let log = Log::default();
    engine.on_change("/w/*.txt", log.callback("glob")).unwrap();

    engine.dispatch(&[
        modified("/w/a.txt"),
        modified("/w/a.txt"),
        modified("/w/a.txt"),
    ]);
    assert_eq!(log.take().len(), 1);
}

#[test]
fn failing_native_watch_leaves_nothing_registered() {
    let (mut engine, _mtimes) = engine();
    let log = Log::default();
    engine.on_change("/ok/a.txt", log.callback("ok")).unwrap();
    engine.watcher_mut().fail_watch("/denied");

    let err = engine
        .on_change("/denied/a.txt", log.callback("denied"))
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err:?}");
    assert_eq!(engine.subscription_count(), 1);
    assert_eq!(
        watched(&engine),
        vec![(PathBuf::from("/ok"), WatchMode::NonRecursive)]
    );

    engine.dispatch(&[modified("/denied/a.txt")]);
    assert!(log.take().is_empty());
}

#[test]
fn invalid_patterns_are_rejected() {
    let (mut engine, _mtimes) = engine();
    let err = engine.on_change("/w/[abc.txt", |_, _| {}).unwrap_err();
    assert!(matches!(err, Error::InvalidGlob { .. }), "{err:?}");
    assert!(watched(&engine).is_empty());
}

#[test]
fn pump_dispatches_queued_events_and_rescans() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 1);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();
    engine.on_change("/w/*.rs", log.callback("rs")).unwrap();

    let handle = engine.watcher().handle();
    handle.push_changes(vec![created("/w/lib.rs")]).unwrap();
    handle
        .push_error(std::io::Error::new(std::io::ErrorKind::Other, "lost"))
        .unwrap();
    handle.push(tessera_vfs::WatchEvent::Rescan).unwrap();

    assert_eq!(engine.pump().unwrap(), 3);
    assert_eq!(
        log.take(),
        vec![
            ("rs", PathBuf::from("/w/lib.rs"), Change::Created),
            ("a", PathBuf::from("/w/a.txt"), Change::Changed),
        ]
    );
    assert_eq!(engine.pump().unwrap(), 0);
}

#[test]
fn shutdown_disposes_every_native_watch() {
    let (mut engine, _mtimes) = engine();
    engine.on_change("/w/a.txt", |_, _| {}).unwrap();
    engine.on_change("/x/*.log", |_, _| {}).unwrap();
    engine.on_change("/y/**", |_, _| {}).unwrap();
    assert_eq!(watched(&engine).len(), 3);

    engine.shutdown();
    assert!(watched(&engine).is_empty());
    assert_eq!(engine.subscription_count(), 0);
}

#[test]
fn run_dispatches_until_stopped() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 1);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();
    let handle = engine.watcher().handle();
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

    let worker = std::thread::spawn(move || {
        engine.run(&stop_rx).unwrap();
        engine
    });

    mtimes.set("/w/a.txt", 2);
    handle.push_changes(vec![modified("/w/a.txt")]).unwrap();

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while log.len() == 0 {
        assert!(
            std::time::Instant::now() < deadline,
            "expected the run loop to dispatch the change"
        );
        std::thread::yield_now();
    }

    stop_tx.send(()).unwrap();
    let engine = worker.join().expect("run loop panicked");
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/a.txt"), Change::Changed)]
    );
    assert_eq!(engine.subscription_count(), 1);
}

#[test]
fn renamed_callback_is_removed_by_its_original_pattern() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 10);
    let id = engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    mtimes.rename("/w/a.txt", "/w/b.txt");
    engine.dispatch(&[deleted("/w/a.txt"), created("/w/b.txt")]);
    assert_eq!(log.take().len(), 1);

    assert!(engine.remove_on_change("/w/a.txt", id));
    assert!(!engine.remove_on_change("/w/a.txt", id));
    assert_eq!(engine.subscription_count(), 0);
    assert!(watched(&engine).is_empty());

    engine.dispatch(&[deleted("/w/b.txt")]);
    assert!(log.take().is_empty());
}

#[test]
fn delete_then_recreate_in_one_burst_ends_with_created() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 10);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    mtimes.set("/w/a.txt", 11);
    engine.dispatch(&[deleted("/w/a.txt"), created("/w/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/a.txt"), Change::Created)]
    );
}

#[test]
fn create_then_delete_in_one_burst_ends_with_deleted() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    engine.on_change("/w/tmp.txt", log.callback("tmp")).unwrap();

    mtimes.set("/w/tmp.txt", 4);
    engine.dispatch(&[created("/w/tmp.txt"), deleted("/w/tmp.txt")]);
    assert_eq!(
        log.take(),
        vec![
            ("tmp", PathBuf::from("/w/tmp.txt"), Change::Created),
            ("tmp", PathBuf::from("/w/tmp.txt"), Change::Deleted),
        ]
    );
}

#[test]
fn superseded_mtime_does_not_pair_with_a_later_create() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 10);
    engine.on_change("/w/a.txt", log.callback("a")).unwrap();

    mtimes.set("/w/a.txt", 11);
    engine.dispatch(&[modified("/w/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/a.txt"), Change::Changed)]
    );

    // b.txt carries the mtime a.txt no longer has.
    mtimes.set("/w/b.txt", 10);
    engine.dispatch(&[created("/w/b.txt")]);
    assert!(log.take().is_empty());

    mtimes.set("/w/a.txt", 12);
    engine.dispatch(&[modified("/w/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/a.txt"), Change::Changed)]
    );
}

#[test]
fn rename_into_an_unwatchable_directory_reports_a_deletion() {
    let (mut engine, mtimes) = engine();
    let log = Log::default();
    mtimes.set("/w/a.txt", 10);
    let id = engine.on_change("/w/a.txt", log.callback("a")).unwrap();
    engine.watcher_mut().fail_watch("/x");

    mtimes.rename("/w/a.txt", "/x/a.txt");
    engine.dispatch(&[deleted("/w/a.txt"), created("/x/a.txt")]);
    assert_eq!(
        log.take(),
        vec![("a", PathBuf::from("/w/a.txt"), Change::Deleted)]
    );
    assert_eq!(
        watched(&engine),
        vec![(PathBuf::from("/w"), WatchMode::NonRecursive)]
    );

    // The callback never left its original path.
    assert!(engine.remove_on_change("/w/a.txt", id));
    assert!(watched(&engine).is_empty());
}
