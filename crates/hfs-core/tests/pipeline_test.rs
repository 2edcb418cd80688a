//! Breach response pipeline: orchestrator -> rate limiter -> router -> offline queue.

mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{ch, FakeLocation, Harness, StalledCamera, StalledUploader};
use hfs_core::{
    BreachReason, BreachRequest, CollaboratorError, DispatchOutcome, Evidence, FlushOutcome, PresentationId,
};

#[tokio::test]
async fn delivered_alert_carries_placeholders_and_normalized_recipient() {
    let h = Harness::new(vec![ch(0, "sub-a").with_line_number("+15550001")]);
    let (_queue, orchestrator) = h.pipeline();

    let outcome = orchestrator
        .respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings"))
        .await;

    assert_eq!(outcome, DispatchOutcome::Delivered);
    let sent = h.transmitter.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "+919876543210");
    assert!(sent[0].body.contains("Breach: AIRPLANE MODE ACTIVATED"));
    assert!(sent[0].body.contains("App: Quick Settings"));
    assert!(sent[0].body.contains("Intruder ID (Slot 1): +15550001"));
    assert!(sent[0].body.contains("Map: GPS signal pending"));
    assert!(sent[0].body.contains("Drive: Pending Upload"));
}

#[tokio::test]
async fn no_channel_parks_the_alert() {
    let h = Harness::new(vec![]);
    let (queue, orchestrator) = h.pipeline();

    let outcome = orchestrator
        .respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings"))
        .await;

    assert_eq!(outcome, DispatchOutcome::Queued);
    assert_eq!(h.transmitter.count(), 0);
    let pending = queue.pending().unwrap().unwrap();
    assert!(pending.body.contains("AIRPLANE MODE ACTIVATED"));
}

#[tokio::test]
async fn transport_failure_parks_the_alert() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    h.transmitter.fail.store(true, Ordering::SeqCst);
    let (queue, orchestrator) = h.pipeline();

    let outcome = orchestrator
        .respond(BreachRequest::new(BreachReason::SystemSurface, "SYSTEM PHONE LOCK"))
        .await;

    assert_eq!(outcome, DispatchOutcome::Queued);
    assert!(queue.pending().unwrap().is_some());
}

#[tokio::test]
async fn second_enqueue_replaces_first() {
    let h = Harness::new(vec![]);
    let (queue, _orchestrator) = h.pipeline();
    queue.enqueue("first").unwrap();
    queue.enqueue("second").unwrap();
    assert_eq!(queue.pending().unwrap().unwrap().body, "second");
}

#[tokio::test]
async fn flush_delivers_once_and_clears() {
    let h = Harness::new(vec![]);
    let (queue, _orchestrator) = h.pipeline();

    assert_eq!(queue.flush_if_possible().await, FlushOutcome::NoPending);
    queue.enqueue("parked").unwrap();
    assert_eq!(queue.flush_if_possible().await, FlushOutcome::StillNoChannel);
    assert!(queue.pending().unwrap().is_some());

    h.channels.set(vec![ch(0, "thief-sim")]);
    assert_eq!(queue.flush_if_possible().await, FlushOutcome::Delivered);
    assert_eq!(h.transmitter.count(), 1);
    assert_eq!(h.transmitter.last_body().as_deref(), Some("parked"));
    assert!(queue.pending().unwrap().is_none());

    assert_eq!(queue.flush_if_possible().await, FlushOutcome::NoPending);
    assert_eq!(h.transmitter.count(), 1);
}

#[tokio::test]
async fn failed_flush_keeps_the_record() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (queue, _orchestrator) = h.pipeline();
    queue.enqueue("parked").unwrap();
    h.transmitter.fail.store(true, Ordering::SeqCst);
    assert_eq!(queue.flush_if_possible().await, FlushOutcome::TransmitFailed);
    assert!(queue.pending().unwrap().is_some());
}

#[tokio::test]
async fn fourth_alert_in_window_is_dropped_not_queued() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (queue, orchestrator) = h.pipeline();

    for _ in 0..3 {
        let outcome = orchestrator
            .respond(BreachRequest::new(BreachReason::SystemSurface, "SYSTEM PHONE LOCK"))
            .await;
        assert_eq!(outcome, DispatchOutcome::Delivered);
        h.clock.advance(1_000);
    }
    let outcome = orchestrator
        .respond(BreachRequest::new(BreachReason::SystemSurface, "SYSTEM PHONE LOCK"))
        .await;
    assert_eq!(outcome, DispatchOutcome::RateLimited);
    assert_eq!(h.transmitter.count(), 3);
    assert!(queue.pending().unwrap().is_none());

    queue.enqueue("parked").unwrap();
    assert_eq!(queue.flush_if_possible().await, FlushOutcome::RateLimited);

    h.clock.advance(300_001);
    assert_eq!(queue.flush_if_possible().await, FlushOutcome::Delivered);
}

#[tokio::test]
async fn presentation_latch_suppresses_repeat_responses() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (_queue, orchestrator) = h.pipeline();
    let request = BreachRequest::new(BreachReason::ForeignApp, "com.mail").for_presentation(PresentationId(4));

    assert_eq!(orchestrator.respond(request.clone()).await, DispatchOutcome::Delivered);
    assert_eq!(orchestrator.respond(request).await, DispatchOutcome::Suppressed);

    let next = BreachRequest::new(BreachReason::ForeignApp, "com.mail").for_presentation(PresentationId(5));
    assert_eq!(orchestrator.respond(next).await, DispatchOutcome::Delivered);
    assert_eq!(h.transmitter.count(), 2);
}

#[tokio::test]
async fn evidence_uploaded_when_online() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (_queue, orchestrator) = h.pipeline();

    orchestrator
        .respond(BreachRequest::new(BreachReason::SystemSurface, "SYSTEM PHONE LOCK").with_evidence(Evidence::CaptureNow))
        .await;

    let body = h.transmitter.last_body().unwrap();
    assert!(body.contains("Drive: https://drive.example//evidence/shot-0.jpg"));
    assert!(h.retry.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn offline_or_failed_upload_goes_to_retry_queue() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (_queue, orchestrator) = h.pipeline();
    h.online.0.store(false, Ordering::SeqCst);

    let captured = PathBuf::from("/evidence/frame.jpg");
    orchestrator
        .respond(BreachRequest::new(BreachReason::ForeignApp, "com.mail").with_evidence(Evidence::Captured(captured.clone())))
        .await;
    assert!(h.transmitter.last_body().unwrap().contains("Drive: Pending Upload"));

    h.online.0.store(true, Ordering::SeqCst);
    h.uploader.fail.store(true, Ordering::SeqCst);
    orchestrator
        .respond(BreachRequest::new(BreachReason::SystemSurface, "SYSTEM PHONE LOCK").with_evidence(Evidence::CaptureNow))
        .await;

    let retried = h.retry.0.lock().unwrap().clone();
    assert_eq!(retried, vec![captured, PathBuf::from("/evidence/shot-0.jpg")]);
}

#[tokio::test]
async fn camera_failure_does_not_block_alert() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    h.camera.fail.store(true, Ordering::SeqCst);
    let (_queue, orchestrator) = h.pipeline();
    let outcome = orchestrator
        .respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings").with_evidence(Evidence::CaptureNow))
        .await;
    assert_eq!(outcome, DispatchOutcome::Delivered);
}

#[tokio::test]
async fn location_link_embedded_and_timeout_falls_back() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (_queue, orchestrator) = h.pipeline();
    let orchestrator = orchestrator.with_location(
        Arc::new(FakeLocation(Ok("https://maps.example/?q=12.9,77.6".into()), Duration::ZERO)),
        Duration::from_millis(200),
    );
    orchestrator
        .respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings"))
        .await;
    assert!(h.transmitter.last_body().unwrap().contains("Map: https://maps.example/?q=12.9,77.6"));

    let (_queue, slow) = h.pipeline();
    let slow = slow.with_location(
        Arc::new(FakeLocation(Ok("https://late".into()), Duration::from_secs(5))),
        Duration::from_millis(20),
    );
    slow.respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings")).await;
    assert!(h.transmitter.last_body().unwrap().contains("Map: GPS signal pending"));

    let (_queue, failing) = h.pipeline();
    let failing = failing.with_location(
        Arc::new(FakeLocation(Err(CollaboratorError::new("gps", "no fix")), Duration::ZERO)),
        Duration::from_millis(200),
    );
    failing.respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings")).await;
    assert!(h.transmitter.last_body().unwrap().contains("Map: GPS signal pending"));
}

#[tokio::test]
async fn missing_emergency_number_drops_alert() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    h.store.set_emergency_number_sealed("").unwrap();
    let (queue, orchestrator) = h.pipeline();
    let outcome = orchestrator
        .respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings"))
        .await;
    assert_eq!(outcome, DispatchOutcome::NoRecipient);
    assert!(queue.pending().unwrap().is_none());
}

#[tokio::test]
async fn every_response_is_logged_as_intruder_record() {
    let h = Harness::new(vec![]);
    let (_queue, orchestrator) = h.pipeline();
    orchestrator
        .respond(BreachRequest::new(BreachReason::ChannelSwap, "SIM CARD REMOVED / SWAPPED"))
        .await;
    let records = h.store.intruder_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, BreachReason::ChannelSwap);
    assert_eq!(records[0].outcome, DispatchOutcome::Queued);
}

#[tokio::test]
async fn no_number_and_no_channel_is_dropped_not_parked() {
    let h = Harness::new(vec![]);
    h.store.set_emergency_number_sealed("").unwrap();
    let (queue, orchestrator) = h.pipeline();
    let outcome = orchestrator
        .respond(BreachRequest::new(BreachReason::ChannelSwap, "SIM CARD REMOVED / SWAPPED"))
        .await;
    assert_eq!(outcome, DispatchOutcome::NoRecipient);
    assert!(queue.pending().unwrap().is_none());
    assert_eq!(h.store.intruder_records().unwrap()[0].outcome, DispatchOutcome::NoRecipient);
}

#[tokio::test]
async fn stalled_upload_falls_back_to_retry_and_still_sends() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (_queue, orchestrator) = h.pipeline();
    let orchestrator = orchestrator
        .with_uploader(Arc::new(StalledUploader), h.retry.clone())
        .with_evidence_timeouts(Duration::from_millis(50), Duration::from_millis(50));

    let captured = PathBuf::from("/evidence/frame.jpg");
    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        orchestrator.respond(
            BreachRequest::new(BreachReason::ForeignApp, "com.mail").with_evidence(Evidence::Captured(captured.clone())),
        ),
    )
    .await
    .expect("response must finish despite a stalled upload");

    assert_eq!(outcome, DispatchOutcome::Delivered);
    assert!(h.transmitter.last_body().unwrap().contains("Drive: Pending Upload"));
    assert_eq!(*h.retry.0.lock().unwrap(), vec![captured]);
}

#[tokio::test]
async fn stalled_camera_does_not_hold_the_alert() {
    let h = Harness::new(vec![ch(0, "sub-a")]);
    let (_queue, orchestrator) = h.pipeline();
    let orchestrator = orchestrator
        .with_camera(Arc::new(StalledCamera))
        .with_evidence_timeouts(Duration::from_millis(50), Duration::from_millis(50));

    let outcome = tokio::time::timeout(
        Duration::from_secs(3),
        orchestrator.respond(BreachRequest::new(BreachReason::RadioKill, "Quick Settings").with_evidence(Evidence::CaptureNow)),
    )
    .await
    .expect("response must finish despite a stalled camera");

    assert_eq!(outcome, DispatchOutcome::Delivered);
    let records = h.store.intruder_records().unwrap();
    assert!(records[0].evidence_path.is_none());
    assert!(h.retry.0.lock().unwrap().is_empty());
}
