// Integration tests for `BridgeManager` discovery caching using fake browsers
// and wiremock bridges.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

use elessar_core::{BridgeManager, BridgeState, CoreError, DiscoveryEvent};

use common::{FakeBrowser, closed_address, mount_paired_bridge, service_name, template};

fn manager() -> BridgeManager<FakeBrowser> {
    BridgeManager::new(FakeBrowser::default(), template())
}

#[tokio::test]
async fn test_events_maintain_resolved_addresses() {
    let bridges = manager();
    let name = service_name("ABC123");
    bridges.browser().announce(&name, "ABC123", "10.0.0.5");

    bridges.handle_event(&DiscoveryEvent::Added(name.clone())).await;
    assert_eq!(bridges.get_address("ABC123").unwrap(), "10.0.0.5");

    bridges.browser().announce(&name, "ABC123", "10.0.0.6");
    bridges.handle_event(&DiscoveryEvent::Updated(name.clone())).await;
    assert_eq!(bridges.get_address("ABC123").unwrap(), "10.0.0.6");

    bridges.handle_event(&DiscoveryEvent::Removed(name)).await;
    assert!(matches!(
        bridges.get_address("ABC123"),
        Err(CoreError::BridgeNotResolved { .. })
    ));
}

#[tokio::test]
async fn test_failed_resolution_drops_record_only() {
    let bridges = manager();
    let good = service_name("GOOD01");
    let bad = service_name("BAD002");
    bridges.browser().announce(&good, "GOOD01", "10.0.0.7");
    bridges.browser().break_resolution(&bad);

    bridges.handle_event(&DiscoveryEvent::Added(good)).await;
    bridges.handle_event(&DiscoveryEvent::Added(bad.clone())).await;
    assert_eq!(bridges.resolved_addresses().len(), 1);

    // The broken record left the known set, so fixing it alone changes nothing.
    bridges.browser().announce(&bad, "BAD002", "10.0.0.8");
    bridges.refresh().await;
    assert!(bridges.get_address("BAD002").is_err());

    bridges.handle_event(&DiscoveryEvent::Added(bad)).await;
    assert_eq!(bridges.get_address("BAD002").unwrap(), "10.0.0.8");
}

#[tokio::test]
async fn test_available_bridges_heals_stale_address() {
    let server = MockServer::start().await;
    mount_paired_bridge(&server, "Hallway", &[]).await;

    let bridges = manager();
    let name = service_name("ABC123");
    bridges.browser().announce(&name, "ABC123", &closed_address());
    bridges.handle_event(&DiscoveryEvent::Added(name.clone())).await;

    // The bridge moved without the browser announcing it.
    bridges
        .browser()
        .announce(&name, "ABC123", &server.address().to_string());

    let first = bridges.available_bridges().await;
    assert!(first.is_empty());
    assert_eq!(
        bridges.get_address("ABC123").unwrap(),
        server.address().to_string()
    );

    let second = bridges.available_bridges().await;
    assert_eq!(second.get("ABC123").map(String::as_str), Some("Hallway"));
}

#[tokio::test]
async fn test_dead_address_is_not_resolved_again() {
    let bridges = manager();
    let name = service_name("ABC123");
    let dead = closed_address();
    bridges.browser().announce(&name, "ABC123", &dead);
    bridges.handle_event(&DiscoveryEvent::Added(name.clone())).await;
    assert_eq!(bridges.get_address("ABC123").unwrap(), dead);

    // Nothing new was heard; the healing pass must not bring the address back.
    assert!(bridges.available_bridges().await.is_empty());
    assert_eq!(bridges.browser().invalidated(), vec![name.clone()]);
    assert!(matches!(
        bridges.get_address("ABC123"),
        Err(CoreError::BridgeNotResolved { .. })
    ));

    let probes_before = bridges.browser().resolve_count();
    assert!(bridges.available_bridges().await.is_empty());
    assert_eq!(bridges.browser().resolve_count(), probes_before, "no probe, no rediscovery");

    // The bridge announces itself at its new address.
    let server = MockServer::start().await;
    mount_paired_bridge(&server, "Hallway", &[]).await;
    bridges
        .browser()
        .announce(&name, "ABC123", &server.address().to_string());
    bridges.handle_event(&DiscoveryEvent::Added(name)).await;
    let available = bridges.available_bridges().await;
    assert_eq!(available.get("ABC123").map(String::as_str), Some("Hallway"));
}

#[tokio::test]
async fn test_concurrent_refreshes_fold_into_one_extra_pass() {
    let bridges = Arc::new(manager());
    let name = service_name("ABC123");
    bridges.browser().announce(&name, "ABC123", "10.0.0.5");
    bridges.handle_event(&DiscoveryEvent::Added(name)).await;
    assert_eq!(bridges.browser().resolve_count(), 1);

    let gate = bridges.browser().hold_next_resolve();
    let first = tokio::spawn({
        let bridges = Arc::clone(&bridges);
        async move { bridges.refresh().await }
    });
    for _ in 0..100 {
        if bridges.browser().resolve_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(bridges.browser().resolve_count(), 2, "first refresh is blocked in resolve");

    // Both callers return at once while the first pass is still blocked.
    for _ in 0..2 {
        tokio::time::timeout(Duration::from_millis(200), bridges.refresh())
            .await
            .expect("refresh in flight, second caller returns immediately");
    }
    assert!(!first.is_finished());
    assert_eq!(bridges.browser().resolve_count(), 2);

    gate.notify_one();
    first.await.unwrap();
    assert_eq!(bridges.browser().resolve_count(), 3, "exactly one extra pass");
    assert_eq!(bridges.get_address("ABC123").unwrap(), "10.0.0.5");
}

#[tokio::test]
async fn test_tracking_bumps_revision() {
    let bridges = manager();
    let rx = bridges.revision();

    assert!(bridges.track_bridge("ABC123").await);
    assert!(!bridges.track_bridge("ABC123").await);
    bridges
        .set_bridge_groups("ABC123", ["1".to_owned(), "2".to_owned()])
        .await
        .unwrap();
    assert!(matches!(
        bridges.set_bridge_groups("NOPE", Vec::new()).await,
        Err(CoreError::BridgeNotTracked { .. })
    ));
    assert_eq!(*rx.borrow(), 2);

    assert_eq!(
        bridges.bridge_states().await,
        vec![BridgeState {
            id: "ABC123".into(),
            name: None,
            group_ids: vec!["1".into(), "2".into()],
            username: None,
        }]
    );

    assert!(bridges.untrack_bridge("ABC123").await);
    assert!(!bridges.untrack_bridge("ABC123").await);
    assert_eq!(*rx.borrow(), 3);
}

#[tokio::test]
async fn test_run_loop_follows_browser() {
    let bridges = Arc::new(manager());
    let name = service_name("ABC123");
    bridges.browser().announce(&name, "ABC123", "10.0.0.5");

    let cancel = CancellationToken::new();
    let handle = bridges.start(cancel.clone()).unwrap();
    bridges.browser().emit(DiscoveryEvent::Added(name)).await;

    let mut resolved = false;
    for _ in 0..50 {
        if bridges.get_address("ABC123").is_ok() {
            resolved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(resolved);
    assert!(bridges.browser().resolve_count() >= 1);

    cancel.cancel();
    handle.await.unwrap();
    bridges.stop().unwrap();
}
