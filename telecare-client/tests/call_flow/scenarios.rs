use crate::utils::{
    FlakyMedia, PumpedMedia, TestRelay, init_tracing, wait_for_state,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telecare_client::{CallConfig, CallHandle, CallState, MediaSource, Orchestrator};
use telecare_core::{ClientMessage, SessionKey};
use tokio::task::JoinHandle;

fn start_call(
    relay: &TestRelay,
    key: &str,
    user: &str,
    media: Arc<dyn MediaSource>,
) -> (
    JoinHandle<()>,
    CallHandle,
    Arc<Mutex<Vec<ClientMessage>>>,
) {
    let (channel, sent) = relay.channel(user);
    let (orchestrator, handle) = Orchestrator::new(
        SessionKey::from(key),
        Box::new(channel),
        media,
        CallConfig::default(),
    );
    (tokio::spawn(orchestrator.run()), handle, sent)
}

fn count_offers(log: &Mutex<Vec<ClientMessage>>) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|m| matches!(m, ClientMessage::Offer { .. }))
        .count()
}

fn count_answers(log: &Mutex<Vec<ClientMessage>>) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .filter(|m| matches!(m, ClientMessage::Answer { .. }))
        .count()
}

#[tokio::test]
async fn lone_participant_waits_without_offering() {
    init_tracing();
    let relay = TestRelay::new();
    let (task, handle, sent) = start_call(&relay, "4711", "patient-7", Arc::new(PumpedMedia));

    let mut status_rx = handle.subscribe_status();
    wait_for_state(&mut status_rx, CallState::WaitingForPeer).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(count_offers(&sent), 0, "nobody to call yet");
    assert!(handle.remote_tracks().is_empty());

    handle.hang_up().await;
    task.await.unwrap();
    assert_eq!(handle.status().state, CallState::Closed);
}

#[tokio::test]
async fn pair_negotiates_connects_and_parts() {
    init_tracing();
    let relay = TestRelay::new();

    let (patient_task, patient, patient_sent) =
        start_call(&relay, "4712", "patient-7", Arc::new(PumpedMedia));
    let mut patient_status = patient.subscribe_status();
    wait_for_state(&mut patient_status, CallState::WaitingForPeer).await;

    let (practitioner_task, practitioner, practitioner_sent) =
        start_call(&relay, "4712", "dr-lang", Arc::new(PumpedMedia));
    let mut practitioner_status = practitioner.subscribe_status();

    // First joiner initiates, joiner answers.
    wait_for_state(&mut patient_status, CallState::Connected).await;
    wait_for_state(&mut practitioner_status, CallState::Connected).await;

    assert_eq!(count_offers(&patient_sent), 1);
    assert_eq!(count_answers(&patient_sent), 0);
    assert_eq!(count_offers(&practitioner_sent), 0);
    assert_eq!(count_answers(&practitioner_sent), 1);

    assert!(!patient.remote_tracks().is_empty());
    assert!(!practitioner.remote_tracks().is_empty());

    let patient_media = patient.local_media().expect("patient media acquired");
    patient.hang_up().await;
    patient.hang_up().await;
    patient_task.await.unwrap();
    assert_eq!(patient.status().state, CallState::Closed);
    assert!(patient_media.is_stopped());
    assert!(patient.remote_tracks().is_empty());

    // The survivor is told and falls back to waiting rather than erroring.
    wait_for_state(&mut practitioner_status, CallState::WaitingForPeer).await;
    assert!(practitioner.remote_tracks().is_empty());
    assert_eq!(relay.registry.session_len(&SessionKey::from("4712")), 1);

    practitioner.hang_up().await;
    practitioner_task.await.unwrap();
    assert_eq!(relay.registry.session_len(&SessionKey::from("4712")), 0);
}

#[tokio::test]
async fn third_caller_is_refused_while_pair_keeps_talking() {
    init_tracing();
    let relay = TestRelay::new();

    let (patient_task, patient, _) =
        start_call(&relay, "4713", "patient-7", Arc::new(PumpedMedia));
    let mut patient_status = patient.subscribe_status();
    wait_for_state(&mut patient_status, CallState::WaitingForPeer).await;

    let (practitioner_task, practitioner, _) =
        start_call(&relay, "4713", "dr-lang", Arc::new(PumpedMedia));
    let mut practitioner_status = practitioner.subscribe_status();
    wait_for_state(&mut patient_status, CallState::Connected).await;
    wait_for_state(&mut practitioner_status, CallState::Connected).await;

    let (intruder_task, intruder, _) =
        start_call(&relay, "4713", "patient-9", Arc::new(PumpedMedia));
    intruder_task.await.unwrap();
    let status = intruder.status();
    assert_eq!(status.state, CallState::Failed);
    assert!(status.last_error.unwrap().contains("full"));

    // The established call never noticed.
    assert_eq!(patient.status().state, CallState::Connected);
    assert_eq!(practitioner.status().state, CallState::Connected);

    patient.hang_up().await;
    practitioner.hang_up().await;
    patient_task.await.unwrap();
    practitioner_task.await.unwrap();
}

#[tokio::test]
async fn media_failure_recovers_when_peer_arrives() {
    init_tracing();
    let relay = TestRelay::new();

    let (patient_task, patient, _) =
        start_call(&relay, "4714", "patient-7", Arc::new(FlakyMedia::failing(1)));
    let mut patient_status = patient.subscribe_status();
    let status = wait_for_state(&mut patient_status, CallState::MediaUnavailable).await;
    assert!(status.last_error.unwrap().contains("camera busy"));
    assert!(patient.local_media().is_none());

    // The devices free up; the peer's arrival is what retries acquisition.
    let (practitioner_task, practitioner, _) =
        start_call(&relay, "4714", "dr-lang", Arc::new(PumpedMedia));
    let mut practitioner_status = practitioner.subscribe_status();

    wait_for_state(&mut patient_status, CallState::Connected).await;
    wait_for_state(&mut practitioner_status, CallState::Connected).await;
    assert!(patient.local_media().is_some());

    patient.hang_up().await;
    practitioner.hang_up().await;
    patient_task.await.unwrap();
    practitioner_task.await.unwrap();
}
