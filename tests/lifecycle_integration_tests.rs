//! Integration tests for the scanner lifecycle on its controlling context
//!
//! These tests verify that the scanner:
//! - Fails once, without touching a camera, when permission is refused
//! - Delivers exactly one result per activation, after the session stopped
//! - Releases the camera exactly once on every exit path
//! - Never starts capture for a screen that left while permission was pending

mod common;

use common::*;
use qrscan::models::{AuthorizationState, FailureReason, MetadataObject, Symbology};
use qrscan::models::ScannerSettings;
use qrscan::services::region::normalized_rect_to_layer;
use qrscan::services::{Rect, Size};
use qrscan::{SessionState, StateChange};
use std::sync::atomic::Ordering;
use tokio::time::timeout;

fn hello() -> Vec<MetadataObject> {
    vec![MetadataObject::code(Symbology::Qr, "HELLO")]
}

/// Shut the scanner down and wait for its task to end
async fn finish(h: &mut Harness) {
    h.handle.shutdown();
    timeout(WAIT, &mut h.task)
        .await
        .expect("Scanner task did not finish")
        .expect("Scanner task panicked");
}

#[tokio::test]
async fn test_denied_permission_fails_once_without_camera() {
    let mut h = spawn(ManualAuthorization::new(AuthorizationState::Denied), FakeProvider::new());

    h.handle.viewport_size_changed(375.0, 812.0);
    h.handle.become_visible();

    let event = next_event(&mut h.events, |e| matches!(e, StateChange::Failure { .. })).await;
    assert_eq!(
        event,
        StateChange::Failure {
            reason: FailureReason::PermissionDenied,
            message: FailureReason::PermissionDenied.user_message().to_string(),
        }
    );

    finish(&mut h).await;
    let extra_failures = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, StateChange::Failure { .. }))
        .count();
    assert_eq!(extra_failures, 0);
    assert_eq!(CameraLog::count(&h.log.acquired), 0);
    assert_eq!(h.handle.snapshot().failure_count, 1);
}

#[tokio::test]
async fn test_first_code_stops_session_before_result() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    h.handle.viewport_size_changed(375.0, 812.0);
    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;

    assert!(h.log.push_frame(hello()));
    let event = next_event(&mut h.events, |e| matches!(e, StateChange::Decoded { .. })).await;
    assert_eq!(
        event,
        StateChange::Decoded {
            raw: "HELLO".to_string(),
            symbology: Symbology::Qr,
        }
    );

    // Stopped and released by the time the result is observable
    assert_eq!(CameraLog::count(&h.log.stops), 1);
    assert_eq!(CameraLog::count(&h.log.releases), 1);
    assert_eq!(h.handle.snapshot().session_state, SessionState::Stopped);

    // A late frame from the same capture thread goes nowhere
    assert!(!h.log.push_frame(hello()));

    finish(&mut h).await;
    let decoded = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, StateChange::Decoded { .. }))
        .count();
    assert_eq!(decoded, 0);
    assert_eq!(h.handle.snapshot().decoded_count, 1);
    assert_eq!(CameraLog::count(&h.log.releases), 1);
}

#[tokio::test]
async fn test_unreadable_and_rejected_codes_are_skipped() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;

    assert!(h.log.push_frame(vec![
        MetadataObject::Face {
            bounds: Rect::unit()
        },
        MetadataObject::code(Symbology::Ean13, "4006381333931"),
    ]));
    assert!(h.log.push_frame(vec![MetadataObject::MachineReadableCode(
        qrscan::models::MachineReadableCode::unreadable(Symbology::Qr)
    )]));
    assert!(h.log.push_frame(vec![
        MetadataObject::code(Symbology::Qr, "FIRST"),
        MetadataObject::code(Symbology::Qr, "SECOND"),
    ]));

    let event = next_event(&mut h.events, |e| matches!(e, StateChange::Decoded { .. })).await;
    assert_eq!(
        event,
        StateChange::Decoded {
            raw: "FIRST".to_string(),
            symbology: Symbology::Qr,
        }
    );

    finish(&mut h).await;
    assert_eq!(h.handle.snapshot().decoded_count, 1);
}

#[tokio::test]
async fn test_confirmation_follows_decode() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;
    h.log.push_frame(hello());

    next_event(&mut h.events, |e| matches!(e, StateChange::Decoded { .. })).await;
    next_event(&mut h.events, |e| *e == StateChange::ConfirmationRequested).await;
    finish(&mut h).await;
}

#[tokio::test]
async fn test_visibility_cycles_release_camera_once_each() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );
    let log = std::sync::Arc::clone(&h.log);

    for cycle in 1..=3 {
        h.handle.become_visible();
        wait_until(|| CameraLog::count(&log.starts) == cycle).await;
        assert_eq!(h.metrics.devices_held(), 1);

        h.handle.become_invisible();
        wait_until(|| CameraLog::count(&log.releases) == cycle).await;
        assert_eq!(h.metrics.devices_held(), 0);
        assert_eq!(CameraLog::count(&log.acquired), cycle);
    }

    finish(&mut h).await;
    assert_eq!(CameraLog::count(&h.log.releases), 3);
    assert_eq!(CameraLog::count(&h.log.locks), CameraLog::count(&h.log.unlocks));
}

#[tokio::test]
async fn test_frames_from_previous_activation_are_dropped() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;
    h.handle.become_invisible();
    h.handle.become_visible();
    wait_until(|| CameraLog::count(&h.log.starts) == 2).await;

    // The first activation's sink was detached when it stopped.
    assert!(!h.log.push_frame_to(0, hello()));
    assert!(h.log.push_frame_to(1, hello()));

    next_event(&mut h.events, |e| matches!(e, StateChange::Decoded { .. })).await;
    finish(&mut h).await;
    assert_eq!(h.handle.snapshot().activation, 2);
    assert_eq!(h.handle.snapshot().decoded_count, 1);
}

#[tokio::test]
async fn test_unknown_permission_prompts_once_then_runs() {
    let auth = ManualAuthorization::new(AuthorizationState::Unknown);
    let mut h = spawn(auth.clone(), FakeProvider::new());

    h.handle.become_visible();
    wait_until(|| auth.requests() == 1).await;
    assert_eq!(CameraLog::count(&h.log.acquired), 0);

    // A second visibility signal while the dialog is open does not prompt again
    h.handle.become_visible();
    auth.answer(true);
    next_event(&mut h.events, is_running).await;
    assert_eq!(h.handle.snapshot().authorization, AuthorizationState::Authorized);

    // The decision is remembered for later activations.
    h.handle.become_invisible();
    h.handle.become_visible();
    wait_until(|| CameraLog::count(&h.log.starts) == 2).await;

    finish(&mut h).await;
    assert_eq!(auth.requests(), 1);
    assert_eq!(h.gate.requests_issued(), 1);
    assert_eq!(h.metrics.devices_held(), 0);
}

#[tokio::test]
async fn test_permission_refused_in_dialog_fails() {
    let auth = ManualAuthorization::new(AuthorizationState::Unknown);
    let mut h = spawn(auth.clone(), FakeProvider::new());

    h.handle.become_visible();
    wait_until(|| auth.requests() == 1).await;
    auth.answer(false);

    let event = next_event(&mut h.events, |e| matches!(e, StateChange::Failure { .. })).await;
    assert!(matches!(
        event,
        StateChange::Failure {
            reason: FailureReason::PermissionDenied,
            ..
        }
    ));

    finish(&mut h).await;
    assert_eq!(CameraLog::count(&h.log.acquired), 0);
}

#[tokio::test]
async fn test_leaving_during_permission_prompt_starts_nothing() {
    let auth = ManualAuthorization::new(AuthorizationState::Unknown);
    let mut h = spawn(auth.clone(), FakeProvider::new());

    h.handle.become_visible();
    wait_until(|| auth.requests() == 1).await;
    h.handle.become_invisible();
    auth.answer(true);

    // The outcome is recorded but capture does not start for a hidden screen.
    next_event(&mut h.events, |e| {
        *e == StateChange::AuthorizationChanged {
            state: AuthorizationState::Authorized,
        }
    })
    .await;

    finish(&mut h).await;
    assert_eq!(CameraLog::count(&h.log.acquired), 0);
    assert!(!drain(&mut h.events).iter().any(is_running));
    assert_ne!(h.handle.snapshot().session_state, SessionState::Running);
}

#[tokio::test]
async fn test_user_cancel_dismisses_and_releases() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;
    h.handle.user_cancelled();

    next_event(&mut h.events, |e| *e == StateChange::Dismissed).await;
    timeout(WAIT, h.task)
        .await
        .expect("Scanner task did not finish")
        .expect("Scanner task panicked");

    assert_eq!(CameraLog::count(&h.log.releases), 1);
    assert!(h.handle.snapshot().is_torn_down);
    // The mailbox is gone with the task.
    assert!(!h.handle.become_visible());
}

#[tokio::test]
async fn test_rejected_output_fails_and_releases() {
    let mut provider = FakeProvider::new();
    provider.reject_output = true;
    let mut h = spawn(ManualAuthorization::new(AuthorizationState::Authorized), provider);

    h.handle.become_visible();
    let event = next_event(&mut h.events, |e| matches!(e, StateChange::Failure { .. })).await;
    assert!(matches!(
        event,
        StateChange::Failure {
            reason: FailureReason::OutputRejected,
            ..
        }
    ));

    finish(&mut h).await;
    assert_eq!(CameraLog::count(&h.log.acquired), 1);
    assert_eq!(CameraLog::count(&h.log.releases), 1);
    assert_eq!(CameraLog::count(&h.log.locks), CameraLog::count(&h.log.unlocks));
    assert_eq!(CameraLog::count(&h.log.starts), 0);
}

#[tokio::test]
async fn test_held_configuration_lock_is_device_unavailable() {
    let mut provider = FakeProvider::new();
    provider.lock_held = true;
    let mut h = spawn(ManualAuthorization::new(AuthorizationState::Authorized), provider);

    h.handle.become_visible();
    let event = next_event(&mut h.events, |e| matches!(e, StateChange::Failure { .. })).await;
    assert!(matches!(
        event,
        StateChange::Failure {
            reason: FailureReason::DeviceUnavailable,
            ..
        }
    ));

    finish(&mut h).await;
    assert_eq!(h.metrics.devices_held(), 0);
}

#[tokio::test]
async fn test_rect_of_interest_matches_scan_window() {
    let mut provider = FakeProvider::new();
    provider.frame = Size::new(375.0, 812.0);
    let mut h = spawn(ManualAuthorization::new(AuthorizationState::Authorized), provider);

    h.handle.viewport_size_changed(375.0, 812.0);
    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;

    let output = h.log.last_output().expect("No output attached");
    let roi = output.rect_of_interest;
    assert!((roi.min_x() - 52.5 / 375.0).abs() < 1e-9);
    assert!((roi.min_y() - 271.0 / 812.0).abs() < 1e-9);
    assert!((roi.size.width - 270.0 / 375.0).abs() < 1e-9);
    assert!((roi.size.height - 270.0 / 812.0).abs() < 1e-9);
    assert_eq!(output.symbologies, vec![Symbology::Qr]);

    let focus = h.log.focus_points.lock().unwrap()[0];
    assert!((focus.x - 0.5).abs() < 1e-9);
    assert!((focus.y - 0.5).abs() < 1e-9);

    finish(&mut h).await;
}

#[tokio::test]
async fn test_resize_applies_to_next_activation() {
    let mut provider = FakeProvider::new();
    provider.frame = Size::new(375.0, 812.0);
    let mut h = spawn(ManualAuthorization::new(AuthorizationState::Authorized), provider);

    h.handle.viewport_size_changed(375.0, 812.0);
    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;

    h.handle.viewport_size_changed(812.0, 375.0);
    next_event(&mut h.events, |e| matches!(e, StateChange::ViewportChanged { .. })).await;
    assert_eq!(h.log.outputs.lock().unwrap().len(), 1);

    h.handle.become_invisible();
    h.handle.become_visible();
    wait_until(|| CameraLog::count(&h.log.starts) == 2).await;

    let outputs = h.log.outputs.lock().unwrap().clone();
    assert_ne!(outputs[0].rect_of_interest, outputs[1].rect_of_interest);
    finish(&mut h).await;
}

#[tokio::test]
async fn test_repeated_visible_while_running_is_ignored() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;
    h.handle.become_visible();
    h.handle.become_visible();

    finish(&mut h).await;
    assert_eq!(CameraLog::count(&h.log.acquired), 1);
    assert_eq!(h.handle.snapshot().activation, 1);
}

#[tokio::test]
async fn test_dropping_every_handle_tears_down() {
    let Harness {
        handle,
        task,
        mut events,
        log,
        metrics,
        ..
    } = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    handle.become_visible();
    next_event(&mut events, is_running).await;
    assert_eq!(metrics.devices_held(), 1);

    // No explicit shutdown: losing the last handle ends the controlling task.
    drop(handle);
    timeout(WAIT, task)
        .await
        .expect("Scanner task outlived its handles")
        .expect("Scanner task panicked");

    assert_eq!(CameraLog::count(&log.stops), 1);
    assert_eq!(CameraLog::count(&log.releases), 1);
    assert_eq!(metrics.devices_held(), 0);
    // The sink was detached with the session.
    assert!(!log.push_frame(hello()));
}

#[tokio::test]
async fn test_scan_window_mask_matches_rect_of_interest() {
    let provider = FakeProvider::new();
    let frame = provider.frame;
    let mut h = spawn(ManualAuthorization::new(AuthorizationState::Authorized), provider);

    h.handle.become_visible();
    let StateChange::ScanWindowChanged { mask } = next_event(&mut h.events, |e| {
        matches!(e, StateChange::ScanWindowChanged { .. })
    })
    .await
    else {
        unreachable!()
    };
    next_event(&mut h.events, is_running).await;

    assert_eq!(mask.opacity, 0.5);
    assert_eq!(mask.bounds, Rect::new(0.0, 0.0, 375.0, 812.0));
    assert_eq!(Some(mask), h.handle.snapshot().scan_window);

    // The hole drawn on screen is the area the camera was told to scan.
    let output = h.log.last_output().expect("No output attached");
    let scanned = normalized_rect_to_layer(PHONE_VIEWPORT, frame, &output.rect_of_interest);
    assert!((scanned.min_x() - mask.hole.min_x()).abs() < 1e-6);
    assert!((scanned.min_y() - mask.hole.min_y()).abs() < 1e-6);
    assert!((scanned.size.width - mask.hole.size.width).abs() < 1e-6);
    assert!((scanned.size.height - mask.hole.size.height).abs() < 1e-6);

    finish(&mut h).await;
}

#[tokio::test]
async fn test_back_to_back_frames_decode_once() {
    let mut h = spawn(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
    );

    h.handle.become_visible();
    next_event(&mut h.events, is_running).await;

    // Both land in the mailbox before the controlling task sees either.
    assert!(h.log.push_frame(hello()));
    assert!(h.log.push_frame(vec![MetadataObject::code(Symbology::Qr, "LATE")]));

    let event = next_event(&mut h.events, |e| matches!(e, StateChange::Decoded { .. })).await;
    assert_eq!(
        event,
        StateChange::Decoded {
            raw: "HELLO".to_string(),
            symbology: Symbology::Qr,
        }
    );

    finish(&mut h).await;
    let extra = drain(&mut h.events)
        .into_iter()
        .filter(|e| matches!(e, StateChange::Decoded { .. }))
        .count();
    assert_eq!(extra, 0);
    assert_eq!(h.handle.snapshot().decoded_count, 1);
    assert_eq!(h.metrics.stale_frames.load(Ordering::Relaxed), 1);
    assert_eq!(CameraLog::count(&h.log.releases), 1);
}

#[tokio::test]
async fn test_activation_waits_for_first_viewport() {
    let mut h = spawn_with(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
        ScannerSettings::default(),
    );

    h.handle.become_visible();
    next_event(&mut h.events, |e| *e == StateChange::VisibilityChanged { is_visible: true }).await;
    assert_eq!(CameraLog::count(&h.log.acquired), 0);
    assert_eq!(h.handle.snapshot().scan_window, None);

    h.handle.viewport_size_changed(375.0, 812.0);
    next_event(&mut h.events, is_running).await;

    assert_eq!(CameraLog::count(&h.log.acquired), 1);
    let window = h.handle.snapshot().scan_window.expect("No scan window");
    assert!((window.hole.size.width - 270.0).abs() < 1e-9);

    finish(&mut h).await;
    assert_eq!(h.handle.snapshot().activation, 1);
}

#[tokio::test]
async fn test_hidden_before_viewport_never_activates() {
    let mut h = spawn_with(
        ManualAuthorization::new(AuthorizationState::Authorized),
        FakeProvider::new(),
        ScannerSettings::default(),
    );

    h.handle.become_visible();
    h.handle.become_invisible();
    h.handle.viewport_size_changed(375.0, 812.0);
    next_event(&mut h.events, |e| matches!(e, StateChange::ViewportChanged { .. })).await;

    finish(&mut h).await;
    assert_eq!(CameraLog::count(&h.log.acquired), 0);
    assert!(!drain(&mut h.events).iter().any(is_running));
}
