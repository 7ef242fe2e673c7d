// Session lifecycle tests against mocked microphone, remote model and speaker

#[macro_use]
mod common;

use common::{mono_frame, speech_payload, ManualSink, MockMicrophone, MockTransport, RemoteEnd};
use maestro_live::audio::codec;
use maestro_live::live::messages::ServerMessage;
use maestro_live::live::{ClientMessage, LiveTransport, TransportEvent};
use maestro_live::{
    AudioSink, CoachError, MicrophoneProvider, SessionConfig, SessionController, SessionState,
    Speaker,
};
use std::sync::Arc;

fn controller(
    transport: &Arc<MockTransport>,
    microphone: &Arc<MockMicrophone>,
    sink: &Arc<ManualSink>,
) -> SessionController {
    SessionController::new(
        SessionConfig::default(),
        transport.clone() as Arc<dyn LiveTransport>,
        microphone.clone() as Arc<dyn MicrophoneProvider>,
        sink.clone() as Arc<dyn AudioSink>,
    )
}

fn server_message(value: serde_json::Value) -> TransportEvent {
    let message: ServerMessage = serde_json::from_value(value).unwrap();
    TransportEvent::Message(message)
}

fn audio_message(secs: f64) -> TransportEvent {
    server_message(serde_json::json!({
        "serverContent": {
            "modelTurn": {
                "parts": [{ "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": speech_payload(secs) } }]
            }
        }
    }))
}

async fn started() -> (
    SessionController,
    Arc<MockTransport>,
    Arc<MockMicrophone>,
    Arc<ManualSink>,
    RemoteEnd,
) {
    let (transport, mut remotes) = MockTransport::new();
    let microphone = MockMicrophone::granted();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);

    controller.start().await.expect("start");
    let remote = remotes.recv().await.expect("remote end");

    (controller, transport, microphone, sink, remote)
}

#[tokio::test]
async fn test_start_goes_active_and_streams_audio() {
    let (controller, _transport, microphone, _sink, mut remote) = started().await;
    assert_eq!(controller.state(), SessionState::Active);
    assert_eq!(remote.setup.model, SessionConfig::default().model);

    microphone
        .sender()
        .send(mono_frame(0.5, 4096, 16000))
        .await
        .unwrap();

    match remote.next_message().await {
        Some(ClientMessage::RealtimeInput(input)) => {
            assert_eq!(input.media.mime_type.as_deref(), Some("audio/pcm;rate=16000"));
            let bytes = codec::decode_transport(&input.media.data).unwrap();
            assert_eq!(bytes.len(), 8192);
        }
        other => panic!("expected audio chunk, got {:?}", other),
    }

    assert!(eventually!(controller.stats().await.chunks_sent == 1));
}

#[tokio::test]
async fn test_device_rate_is_resampled_before_sending() {
    let (_controller, _transport, microphone, _sink, mut remote) = started().await;

    // 48kHz device: 12288 samples become one 4096-sample block at 16kHz
    let tx = microphone.sender();
    tx.send(mono_frame(0.1, 12288, 48000)).await.unwrap();
    tx.send(mono_frame(0.1, 3, 48000)).await.unwrap();

    match remote.next_message().await {
        Some(ClientMessage::RealtimeInput(input)) => {
            let bytes = codec::decode_transport(&input.media.data).unwrap();
            assert_eq!(bytes.len(), 8192);
        }
        other => panic!("expected audio chunk, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_start_is_rejected_while_active() {
    let (controller, transport, microphone, _sink, _remote) = started().await;

    let result = controller.start().await;

    assert!(matches!(
        result,
        Err(CoachError::SessionActive(SessionState::Active))
    ));
    assert_eq!(transport.connects(), 1);
    assert_eq!(microphone.acquisitions.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (controller, _transport, microphone, _sink, mut remote) = started().await;

    controller.stop().await.unwrap();
    controller.stop().await.unwrap();

    assert_eq!(controller.state(), SessionState::Closed);
    assert_eq!(microphone.stops(), 1);
    assert!(matches!(remote.next_message().await, Some(ClientMessage::Close)));
    assert!(remote.next_message().await.is_none());
}

#[tokio::test]
async fn test_stop_without_session_stays_idle() {
    let (transport, _remotes) = MockTransport::new();
    let microphone = MockMicrophone::granted();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);

    controller.stop().await.unwrap();

    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_audio_after_stop_is_not_sent() {
    let (controller, _transport, microphone, _sink, mut remote) = started().await;
    let tx = microphone.sender();

    controller.stop().await.unwrap();
    let _ = tx.send(mono_frame(0.5, 4096, 16000)).await;

    assert!(matches!(remote.next_message().await, Some(ClientMessage::Close)));
    assert!(remote.next_message().await.is_none());
}

#[tokio::test]
async fn test_denied_microphone_never_connects() {
    let (transport, _remotes) = MockTransport::new();
    let microphone = MockMicrophone::denied();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);

    let result = controller.start().await;

    assert!(matches!(result, Err(CoachError::Permission(_))));
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_rejected_handshake_reverts_to_idle() {
    let (transport, _remotes) = MockTransport::rejecting("model not found");
    let microphone = MockMicrophone::granted();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);

    let result = controller.start().await;

    assert!(matches!(result, Err(CoachError::Connection(_))));
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(microphone.stops(), 1, "microphone released");

    // Not stuck: a later start may try again
    assert!(matches!(
        controller.start().await,
        Err(CoachError::Connection(_))
    ));
    assert_eq!(transport.connects(), 2);
}

#[tokio::test]
async fn test_stop_during_handshake_cancels_the_session() {
    let (transport, mut remotes, gate) = MockTransport::gated();
    let microphone = MockMicrophone::granted();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);

    let starting = tokio::spawn({
        let controller = controller.clone();
        async move { controller.start().await }
    });

    assert!(eventually!(transport.connects() == 1));
    assert_eq!(controller.state(), SessionState::Connecting);

    controller.stop().await.unwrap();
    assert_eq!(controller.state(), SessionState::Closed);
    assert_eq!(microphone.stops(), 1);

    // Handshake completes after the stop
    gate.send(()).unwrap();
    starting.await.unwrap().expect("superseded start resolves quietly");

    let mut remote = remotes.recv().await.expect("remote end");
    assert!(matches!(remote.next_message().await, Some(ClientMessage::Close)));
    assert!(remote.next_message().await.is_none(), "no audio on a cancelled session");

    // The stale link may still deliver; nothing is played or recorded
    let _ = remote.events.send(audio_message(0.5)).await;
    let _ = remote
        .events
        .send(server_message(serde_json::json!({
            "serverContent": { "outputTranscription": { "text": "too late" } }
        })))
        .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(sink.started().is_empty(), "no playback scheduled");
    assert!(controller.transcript().await.is_empty());
    assert_eq!(controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_transcript_is_not_appended_while_stopping() {
    let (transport, mut remotes) = MockTransport::new();
    let (microphone, release) = MockMicrophone::slow_release();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);

    controller.start().await.unwrap();
    let remote = remotes.recv().await.unwrap();

    let stopping = tokio::spawn({
        let controller = controller.clone();
        async move { controller.stop().await }
    });

    // Teardown is now waiting on the device release
    assert!(eventually!(microphone.releases() == 1));

    remote
        .events
        .send(server_message(serde_json::json!({
            "serverContent": { "outputTranscription": { "text": "mid-stop" } }
        })))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(controller.transcript().await.is_empty());

    release.send(()).unwrap();
    stopping.await.unwrap().unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(controller.state(), SessionState::Closed);
    assert!(controller.transcript().await.is_empty());
}

#[tokio::test]
async fn test_remote_close_ends_session() {
    let (controller, _transport, microphone, sink, remote) = started().await;
    remote.events.send(audio_message(0.5)).await.unwrap();
    assert!(eventually!(sink.started().len() == 1));

    remote
        .events
        .send(TransportEvent::Closed {
            reason: Some("session timeout".to_string()),
        })
        .await
        .unwrap();

    assert!(eventually!(controller.state() == SessionState::Closed));
    assert!(eventually!(microphone.stops() == 1));
    assert_eq!(sink.stopped().len(), 1, "pending playback stopped");
}

#[tokio::test]
async fn test_remote_error_ends_session() {
    let (controller, _transport, microphone, _sink, remote) = started().await;

    remote
        .events
        .send(TransportEvent::Error("quota exceeded".to_string()))
        .await
        .unwrap();

    assert!(eventually!(controller.state() == SessionState::Closed));
    assert!(eventually!(microphone.stops() == 1));
}

#[tokio::test]
async fn test_dropped_link_ends_session() {
    let (controller, _transport, _microphone, _sink, remote) = started().await;

    drop(remote);

    assert!(eventually!(controller.state() == SessionState::Closed));
}

#[tokio::test]
async fn test_transcript_follows_arrival_order() {
    let (controller, _transport, _microphone, _sink, remote) = started().await;
    let mut updates = controller.subscribe_transcript();

    remote
        .events
        .send(server_message(serde_json::json!({
            "serverContent": { "inputTranscription": { "text": "How do I voice" } }
        })))
        .await
        .unwrap();
    remote
        .events
        .send(server_message(serde_json::json!({
            "serverContent": {
                "outputTranscription": { "text": "Spread the" },
                "inputTranscription": { "text": " a seventh?" }
            }
        })))
        .await
        .unwrap();
    remote
        .events
        .send(server_message(serde_json::json!({
            "serverContent": { "outputTranscription": { "text": " voicing" } }
        })))
        .await
        .unwrap();

    assert!(eventually!(controller.transcript().await.len() == 4));

    let transcript = controller.transcript().await;
    let lines: Vec<(Speaker, &str)> = transcript
        .iter()
        .map(|e| (e.speaker, e.text.as_str()))
        .collect();
    assert_eq!(
        lines,
        vec![
            (Speaker::User, "How do I voice"),
            (Speaker::Model, "Spread the"),
            (Speaker::User, " a seventh?"),
            (Speaker::Model, " voicing"),
        ]
    );

    let first = updates.recv().await.unwrap();
    assert_eq!(first.display(), "You: How do I voice");
}

#[tokio::test]
async fn test_model_audio_is_scheduled_back_to_back() {
    let (transport, mut remotes) = MockTransport::new();
    let microphone = MockMicrophone::granted();
    let sink = ManualSink::new();
    sink.set_time(2.0);
    let controller = controller(&transport, &microphone, &sink);
    controller.start().await.unwrap();
    let remote = remotes.recv().await.unwrap();

    sink.set_time(4.0);
    remote.events.send(audio_message(0.5)).await.unwrap();
    remote.events.send(audio_message(0.5)).await.unwrap();

    assert!(eventually!(sink.started().len() == 2));
    let started = sink.started();
    assert!((started[0].start_at - 4.0).abs() < 1e-9);
    assert!((started[1].start_at - 4.5).abs() < 1e-9);

    let stats = controller.stats().await;
    assert_eq!(stats.units_scheduled, 2);
    assert_eq!(stats.units_in_flight, 2);
}

#[tokio::test]
async fn test_malformed_audio_does_not_end_session() {
    let (controller, _transport, _microphone, sink, remote) = started().await;

    remote
        .events
        .send(server_message(serde_json::json!({
            "serverContent": {
                "modelTurn": { "parts": [{ "inlineData": { "mimeType": "audio/pcm", "data": "!!!" } }] }
            }
        })))
        .await
        .unwrap();
    remote.events.send(audio_message(0.25)).await.unwrap();

    assert!(eventually!(sink.started().len() == 1));
    assert_eq!(controller.state(), SessionState::Active);
    assert_eq!(controller.stats().await.units_dropped, 1);
}

#[tokio::test]
async fn test_restart_after_closed() {
    let (transport, mut remotes) = MockTransport::new();
    let microphone = MockMicrophone::granted();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);

    controller.start().await.unwrap();
    let first = remotes.recv().await.unwrap();
    first
        .events
        .send(server_message(serde_json::json!({
            "serverContent": { "outputTranscription": { "text": "Welcome" } }
        })))
        .await
        .unwrap();
    assert!(eventually!(controller.transcript().await.len() == 1));
    controller.stop().await.unwrap();

    controller.start().await.expect("restart");
    let _second = remotes.recv().await.unwrap();

    assert_eq!(controller.state(), SessionState::Active);
    assert_eq!(transport.connects(), 2);
    assert_eq!(controller.transcript().await.len(), 1, "transcript kept across sessions");

    let stats = controller.stats().await;
    assert!(stats.session_id.is_some());
    assert_eq!(stats.chunks_sent, 0);
}

#[tokio::test]
async fn test_state_transitions_are_observable() {
    let (transport, mut remotes) = MockTransport::new();
    let microphone = MockMicrophone::granted();
    let sink = ManualSink::new();
    let controller = controller(&transport, &microphone, &sink);
    let mut states = controller.subscribe_state();

    controller.start().await.unwrap();
    let _remote = remotes.recv().await.unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Active);

    controller.stop().await.unwrap();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), SessionState::Closed);
}
