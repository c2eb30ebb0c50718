//! Integration tests for the offers facade

mod common;

use common::{harness, offer, offer_frame, settle, wait_until};
use hypersockets::JoinOutcome;
use marketplace::{AlertLevel, OfferStatus, OfferTransition, RealtimeError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn test_join_and_leave_offers_room() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    assert!(wait_until(|| offers.is_connected()).await);

    assert_eq!(offers.join_offers_room(), JoinOutcome::Joined);
    assert_eq!(offers.join_offers_room(), JoinOutcome::AlreadyJoined);
    assert!(wait_until(|| h.servers.offers.sent_types(0).contains(&"join_offers_room".to_string())).await);

    assert!(offers.leave_offers_room());
    assert!(!offers.leave_offers_room());
    assert!(wait_until(|| h.servers.offers.sent_types(0).contains(&"leave_offers_room".to_string())).await);

    let joins = h
        .servers
        .offers
        .sent_types(0)
        .iter()
        .filter(|t| t.as_str() == "join_offers_room")
        .count();
    assert_eq!(joins, 1);
}

#[tokio::test]
async fn test_transitions_land_in_buckets_and_clear_once() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    assert!(wait_until(|| offers.is_connected()).await);
    offers.join_offers_room();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let _token = offers.on_offer_event(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    h.servers.offers.push(offer_frame("new_offer", "o1", OfferStatus::Pending, 10));
    h.servers.offers.push(offer_frame("new_offer", "o2", OfferStatus::Pending, 11));
    h.servers.offers.push(offer_frame("offer_accepted", "o1", OfferStatus::Accepted, 20));
    assert!(wait_until(|| seen.load(Ordering::SeqCst) == 3).await);

    assert_eq!(offers.new_offers().len(), 2);
    assert_eq!(offers.accepted_offers().len(), 1);
    assert_eq!(offers.offer("o1").map(|o| o.status), Some(OfferStatus::Accepted));

    let cleared = offers.clear_offer_event("o1");
    let transitions: Vec<OfferTransition> = cleared.iter().map(|e| e.transition).collect();
    assert_eq!(
        transitions,
        vec![OfferTransition::Created, OfferTransition::Accepted]
    );
    assert!(offers.clear_offer_event("o1").is_empty());

    let remaining = offers.buckets();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining.new_offers[0].offer.id, "o2");

    // Cached offers outlive their bucket entries
    assert!(offers.offer("o1").is_some());

    let all = offers.clear_all_offer_events();
    assert_eq!(all.len(), 1);
    assert!(offers.buckets().is_empty());
}

#[tokio::test]
async fn test_terminal_offers_ignore_late_transitions() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    assert!(wait_until(|| offers.is_connected()).await);

    h.servers.offers.push(offer_frame("offer_rejected", "o1", OfferStatus::Rejected, 10));
    assert!(wait_until(|| offers.rejected_offers().len() == 1).await);

    h.servers.offers.push(offer_frame("offer_accepted", "o1", OfferStatus::Accepted, 20));
    settle().await;

    assert_eq!(offers.offer("o1").map(|o| o.status), Some(OfferStatus::Rejected));
    assert!(offers.accepted_offers().is_empty());
}

#[tokio::test]
async fn test_revoked_offer_raises_warning() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    assert!(wait_until(|| offers.is_connected()).await);

    h.servers.offers.push(offer_frame("offer_accepted", "o1", OfferStatus::Accepted, 10));
    h.servers.offers.push(offer_frame("offer_revoked", "o1", OfferStatus::Revoked, 20));
    assert!(wait_until(|| offers.revoked_offers().len() == 1).await);

    let alerts = h.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].level, AlertLevel::Warning);
    assert_eq!(alerts[0].title, "Offer revoked");
}

#[tokio::test]
async fn test_cancel_non_pending_offer_fails_without_request() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    h.api.set_offers(vec![offer("o1", OfferStatus::Accepted, 10)]);
    offers.fetch_my_offers(None).await.unwrap();

    let err = offers.cancel_offer("o1").await.unwrap_err();
    assert_eq!(
        err,
        RealtimeError::InvalidOfferState {
            offer_id: "o1".to_string(),
            status: OfferStatus::Accepted,
            action: "cancel",
        }
    );
    assert_eq!(h.api.call_count("cancel_offer"), 0);
    assert_eq!(offers.error(), Some(err));

    let missing = offers.cancel_offer("nope").await.unwrap_err();
    assert!(matches!(missing, RealtimeError::OfferNotFound(_)));
    assert_eq!(h.api.call_count("cancel_offer"), 0);
}

#[tokio::test]
async fn test_cancel_pending_offer() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    h.api.set_offers(vec![offer("o1", OfferStatus::Pending, 10)]);
    offers.fetch_my_offers(Some(OfferStatus::Pending)).await.unwrap();

    offers.cancel_offer("o1").await.unwrap();
    assert_eq!(h.api.call_count("cancel_offer"), 1);
    assert_eq!(offers.offer("o1").map(|o| o.status), Some(OfferStatus::Cancelled));
    assert_eq!(offers.error(), None);

    // A stale listing does not resurrect the pending state
    offers.fetch_my_offers(None).await.unwrap();
    assert_eq!(offers.offer("o1").map(|o| o.status), Some(OfferStatus::Cancelled));
}

#[tokio::test]
async fn test_cancel_failure_keeps_offer_pending() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    h.api.set_offers(vec![offer("o1", OfferStatus::Pending, 10)]);
    offers.fetch_my_offers(None).await.unwrap();

    h.api.fail("cancel_offer");
    let err = offers.cancel_offer("o1").await.unwrap_err();
    assert!(matches!(err, RealtimeError::Api { status: 500, .. }));
    assert_eq!(offers.offer("o1").map(|o| o.status), Some(OfferStatus::Pending));
    assert_eq!(offers.error(), Some(err));
}

#[tokio::test]
async fn test_fetch_merges_with_socket_state() {
    let h = harness();
    let offers = h.session.offers().unwrap();
    assert!(wait_until(|| offers.is_connected()).await);

    h.servers.offers.push(offer_frame("offer_accepted", "o1", OfferStatus::Accepted, 50));
    assert!(wait_until(|| offers.offer("o1").is_some()).await);

    h.api.set_offers(vec![
        offer("o1", OfferStatus::Pending, 10),
        offer("o2", OfferStatus::Pending, 20),
    ]);
    let listed = offers.fetch_my_offers(None).await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(offers.offer("o1").map(|o| o.status), Some(OfferStatus::Accepted));
    assert_eq!(offers.offer("o2").map(|o| o.status), Some(OfferStatus::Pending));
    assert_eq!(offers.offers().len(), 2);

    offers.fetch_received_offers(None).await.unwrap();
    assert_eq!(offers.offers().len(), 2);
}
