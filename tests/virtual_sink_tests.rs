// Tests for the tokio-clocked output device

use maestro_live::audio::{AudioSink, PlaybackScheduler, VirtualSink};
use std::sync::Arc;
use std::time::Duration;

fn half_second() -> Vec<Vec<f32>> {
    vec![vec![0.0; 12000]]
}

#[tokio::test(start_paused = true)]
async fn test_clock_follows_tokio_time() {
    let sink = VirtualSink::new();
    assert!(sink.current_time() < 1e-6);

    tokio::time::advance(Duration::from_millis(1500)).await;

    assert!((sink.current_time() - 1.5).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_units_complete_at_their_end_time() {
    let sink = Arc::new(VirtualSink::new());
    let mut scheduler = PlaybackScheduler::new(sink.clone() as Arc<dyn AudioSink>, 24000, 1);

    scheduler.schedule(half_second()).unwrap();
    scheduler.schedule(half_second()).unwrap();
    assert_eq!(sink.pending(), 2);

    // First ends at 0.5s, second at 1.0s
    tokio::time::sleep(Duration::from_millis(600)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.completed(), 1);
    assert_eq!(scheduler.in_flight(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.completed(), 2);
    assert_eq!(scheduler.in_flight(), 0);
    assert_eq!(sink.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_playback() {
    let sink = Arc::new(VirtualSink::new());
    let mut scheduler = PlaybackScheduler::new(sink.clone() as Arc<dyn AudioSink>, 24000, 1);

    scheduler.schedule(half_second()).unwrap();
    scheduler.schedule(half_second()).unwrap();
    scheduler.stop_all();

    assert_eq!(sink.pending(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.completed(), 0, "stopped units never complete");
}
