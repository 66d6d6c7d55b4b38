//! Behaviour Contract Test: dyndns2 Update Protocol
//!
//! This test verifies the inbound `/nic/update` state machine end to end.
//!
//! Constraints verified:
//! - First update answers `good <ip>`, an identical second one `nochg <ip>`
//! - A different but valid hostname answers `nohost`, an invalid one `notfqdn`
//! - Every authentication failure answers the same 401 `badauth`, including
//!   a host deleted between authentication and the address write
//! - Concurrent identical updates for one host serialise: exactly one
//!   answers `good`
//! - An accepted address change is propagated to the engine off the
//!   request path, and the dependent record gets pushed
//!
//! If this test fails, dyndns2 clients see wrong answers.

mod common;

use chrono::Utc;
use common::*;
use ddnsbroker_core::{
    EngineConfig, Host, MemoryStore, PropagationEngine, Record, Repository, UpdateHandler,
    UpdateRequest, UpdateResponse, UpdateTarget,
};
use std::sync::Arc;

fn update(auth: Option<String>, hostname: Option<&str>, myip: &[&str]) -> UpdateRequest {
    UpdateRequest {
        authorization: auth,
        hostname: hostname.map(str::to_string),
        myip: myip.iter().map(|s| s.to_string()).collect(),
        remote_addr: Some("192.0.2.200".parse().unwrap()),
    }
}

async fn handler() -> UpdateHandler {
    let fixture = Fixture::new().await;
    UpdateHandler::new(fixture.repo.clone(), "ddnsbroker")
}

#[tokio::test]
async fn first_update_good_then_nochg() {
    let handler = handler().await;
    let request = update(
        Some(basic_auth(HOST_FQDN, HOST_SECRET)),
        Some(HOST_FQDN),
        &["203.0.113.5"],
    );

    let first = handler.handle(&request, Utc::now()).await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.body(), "good 203.0.113.5");

    let second = handler.handle(&request, Utc::now()).await.unwrap();
    assert_eq!(second.body(), "nochg 203.0.113.5");
}

#[tokio::test]
async fn dual_stack_update_lists_both_families() {
    let handler = handler().await;
    let request = update(
        Some(basic_auth(HOST_FQDN, HOST_SECRET)),
        None,
        &["2001:db8::7", "203.0.113.5"],
    );

    let response = handler.handle(&request, Utc::now()).await.unwrap();
    assert_eq!(response.body(), "good 203.0.113.5,2001:db8::7");
}

#[tokio::test]
async fn missing_myip_uses_caller_address() {
    let handler = handler().await;
    let request = update(Some(basic_auth(HOST_FQDN, HOST_SECRET)), None, &[]);

    let response = handler.handle(&request, Utc::now()).await.unwrap();
    assert_eq!(response.body(), "good 192.0.2.200");
}

#[tokio::test]
async fn other_hostname_is_nohost() {
    let handler = handler().await;
    let request = update(
        Some(basic_auth(HOST_FQDN, HOST_SECRET)),
        Some("other.example.com"),
        &["203.0.113.5"],
    );
    assert_eq!(handler.handle(&request, Utc::now()).await.unwrap().body(), "nohost");

    let request = update(
        Some(basic_auth(HOST_FQDN, HOST_SECRET)),
        Some("under_score"),
        &["203.0.113.5"],
    );
    assert_eq!(handler.handle(&request, Utc::now()).await.unwrap().body(), "notfqdn");
}

#[tokio::test]
async fn auth_failures_are_indistinguishable() {
    let handler = handler().await;

    let cases = [
        None,
        Some("Basic !!!".to_string()),
        Some("Token abc".to_string()),
        Some(basic_auth(HOST_FQDN, "wrong")),
        Some(basic_auth("unknown.example.com", HOST_SECRET)),
    ];

    for auth in cases {
        let response = handler
            .handle(&update(auth, None, &["203.0.113.5"]), Utc::now())
            .await
            .unwrap();
        assert_eq!(response, UpdateResponse::BadAuth);
        assert_eq!(response.status(), 401);
        assert_eq!(response.body(), "badauth");
    }
}

#[tokio::test]
async fn accepted_update_is_propagated_by_running_engine() {
    let (repo, queue) = Repository::with_queue(Arc::new(MemoryStore::new()), 16);
    let repo = Arc::new(repo);
    let client = Arc::new(RecordingClient::new());
    let (engine, _events) =
        PropagationEngine::new(repo.clone(), client.clone(), &EngineConfig::default()).unwrap();

    let host = repo
        .create_host(Host::new(HOST_FQDN, HOST_SECRET, Utc::now()), Utc::now())
        .await
        .unwrap();
    let target = repo
        .create_target(UpdateTarget::new("dyn", "https://dyn.example.net/nic/update"))
        .await
        .unwrap();
    let record = repo
        .create_record(
            Record::new(host.id, target.id, Utc::now())
                .with_fqdn("www.example.com")
                .with_ipv4(24, "0.0.0.42".parse().unwrap())
                .with_credentials("user", "pw"),
            Utc::now(),
        )
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(queue, shutdown_rx).await });

    let handler = UpdateHandler::new(repo.clone(), "ddnsbroker");
    let response = handler
        .handle(
            &update(Some(basic_auth(HOST_FQDN, HOST_SECRET)), None, &["203.0.113.5"]),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(response.body(), "good 203.0.113.5");

    // the push happens off the request path
    let pushed = tokio::time::timeout(tokio::time::Duration::from_secs(5), async {
        loop {
            if client.push_count() > 0 {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(pushed.is_ok(), "record should be pushed within 5 seconds");

    let request = &client.requests()[0];
    assert_eq!(request.hostname, "www.example.com");
    assert_eq!(request.address.to_string(), "203.0.113.42");

    shutdown_tx.send(()).unwrap();
    engine_handle.await.unwrap().unwrap();

    // give the spawned push task a moment to commit its bookkeeping
    let committed = tokio::time::timeout(tokio::time::Duration::from_secs(5), async {
        loop {
            let stored = repo.record(record.id).await.unwrap().unwrap();
            if stored.last_ipv4_update.is_some() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(committed.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_updates_report_one_change() {
    let handler = Arc::new(handler().await);
    let request = update(Some(basic_auth(HOST_FQDN, HOST_SECRET)), None, &["203.0.113.9"]);

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let handler = handler.clone();
        let request = request.clone();
        tasks.spawn(async move { handler.handle(&request, Utc::now()).await.unwrap() });
    }

    let mut bodies = Vec::new();
    while let Some(response) = tasks.join_next().await {
        bodies.push(response.unwrap().body());
    }

    let goods = bodies.iter().filter(|b| *b == "good 203.0.113.9").count();
    let nochgs = bodies.iter().filter(|b| *b == "nochg 203.0.113.9").count();
    assert_eq!(goods, 1, "bodies: {:?}", bodies);
    assert_eq!(nochgs, 7);
}

#[tokio::test]
async fn host_deleted_after_authentication_is_badauth() {
    let store = SpyStore::new();
    let repo = Arc::new(Repository::new(store.clone()));
    repo.create_host(Host::new(HOST_FQDN, HOST_SECRET, Utc::now()), Utc::now())
        .await
        .unwrap();
    let handler = UpdateHandler::new(repo, "ddnsbroker");

    // lookup by fqdn still finds it, the write no longer does
    store.set_hosts_hidden(true);

    let response = handler
        .handle(
            &update(Some(basic_auth(HOST_FQDN, HOST_SECRET)), None, &["203.0.113.5"]),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(response, UpdateResponse::BadAuth);
}
