mod common;

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use clasign_sql::{SQLStore, SqliteStore};
use signing::model::{NewManager, Role};
use signing::{SigningConfig, SigningError, SigningService};

use common::{corporate, individual, link_input, ready_link, workers, Workers};

const WORKERS: usize = 8;

/// Run `op` on `WORKERS` threads released together. Thread `i` drives its
/// own service instance, so every thread writes through its own connection.
fn race<T, F>(w: &Workers, op: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, &SigningService) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(WORKERS));
    let op = Arc::new(op);
    let handles: Vec<_> = w
        .svcs
        .iter()
        .enumerate()
        .map(|(i, svc)| {
            let barrier = Arc::clone(&barrier);
            let op = Arc::clone(&op);
            let svc = Arc::clone(svc);
            thread::spawn(move || {
                barrier.wait();
                op(i, &svc)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

fn pool() -> Workers {
    workers(WORKERS, SigningConfig::default())
}

#[test]
fn concurrent_individual_signing_records_once() {
    let w = pool();
    let link = ready_link(&w.svcs[0]);
    let results = race(&w, move |_, svc| svc.sign_individual(&link, individual("a@corp.com")));

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, SigningError::AlreadySigned)));
}

#[test]
fn concurrent_link_creation_leaves_one_ready_link() {
    let w = pool();
    let results = race(&w, |_, svc| svc.create_link(link_input("orgX", "repoY", None)));

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, SigningError::AlreadyExists(_))));
    let ready = w.svcs[0]
        .list_links("github", &["orgX".to_string()])
        .unwrap();
    assert_eq!(ready.len(), 1);
}

#[test]
fn concurrent_admins_leave_exactly_one() {
    let w = pool();
    let link = ready_link(&w.svcs[0]);
    let created = w.svcs[0]
        .sign_corporate(&link, corporate("alice@corp.com", "Corp"))
        .unwrap();
    w.svcs[0].revoke_admin(&created.signing_id).unwrap();

    let signing_id = created.signing_id.clone();
    let results = race(&w, move |i, svc| {
        svc.add_admin(
            &signing_id,
            NewManager {
                id: None,
                name: format!("Admin {i}"),
                email: format!("admin{i}@corp.com"),
            },
        )
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, SigningError::DuplicateAdmin)));
    let admins = w.svcs[1]
        .list_managers(&created.signing_id, Some(Role::Admin))
        .unwrap();
    assert_eq!(admins.len(), 1);
}

#[test]
fn concurrent_corporate_signing_records_once() {
    let w = pool();
    let link = ready_link(&w.svcs[0]);
    let results = race(&w, move |_, svc| {
        svc.sign_corporate(&link, corporate("alice@corp.com", "Corp"))
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, SigningError::AlreadySigned)));
}

#[test]
fn code_is_accepted_by_one_worker_only() {
    let w = pool();
    let issued = w.svcs[0].issue_code("u@x.com", "signup").unwrap();
    let code = issued.code.clone();
    let results = race(&w, move |_, svc| svc.verify_code("u@x.com", "signup", &code));

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, SigningError::Denied(_))));
}

#[test]
fn concurrent_code_issues_leave_one_live_code() {
    let w = workers(
        WORKERS,
        SigningConfig {
            code_issue_interval: 0,
            ..SigningConfig::default()
        },
    );
    let issued = race(&w, |_, svc| svc.issue_code("u@x.com", "signup").unwrap());

    let accepted = issued
        .iter()
        .filter(|c| w.svcs[0].verify_code("u@x.com", "signup", &c.code).is_ok())
        .count();
    assert_eq!(accepted, 1);
}

#[test]
fn throttle_admits_one_issue_per_interval() {
    let w = pool();
    let results = race(&w, |_, svc| svc.issue_code("u@x.com", "signup"));
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
}

#[test]
fn write_waits_out_a_held_lock() {
    let w = pool();
    let link = ready_link(&w.svcs[0]);

    // Another connection holds the write lock longer than one busy timeout.
    let (locked_tx, locked_rx) = mpsc::channel();
    let db_path = w.db_path.clone();
    let holder = thread::spawn(move || {
        let store = SqliteStore::open(&db_path).unwrap();
        let tx = store.begin().unwrap();
        locked_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(400));
        drop(tx);
    });
    locked_rx.recv().unwrap();

    let started = Instant::now();
    w.svcs[1]
        .sign_individual(&link, individual("a@corp.com"))
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(250));
    holder.join().unwrap();

    assert!(matches!(
        w.svcs[2].sign_individual(&link, individual("a@corp.com")),
        Err(SigningError::AlreadySigned)
    ));
}
