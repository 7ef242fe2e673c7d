use maestro_live::session::{Speaker, TranscriptLog};

#[tokio::test]
async fn test_entries_keep_arrival_order_without_merging() {
    let log = TranscriptLog::new();

    log.append(Speaker::User, "What is a").await;
    log.append(Speaker::User, " Neapolitan sixth?").await;
    log.append(Speaker::Model, "It is").await;

    let entries = log.snapshot().await;
    assert_eq!(entries.len(), 3, "fragments are not merged");
    assert_eq!(entries[1].text, " Neapolitan sixth?");
    assert_eq!(entries[2].speaker, Speaker::Model);
    assert!(entries[0].received_at <= entries[2].received_at);
}

#[tokio::test]
async fn test_empty_fragments_are_recorded() {
    let log = TranscriptLog::new();
    assert!(log.is_empty().await);

    log.append(Speaker::Model, "").await;

    assert_eq!(log.len().await, 1);
}

#[tokio::test]
async fn test_subscribers_see_new_entries() {
    let log = TranscriptLog::new();
    log.append(Speaker::User, "before").await;
    let mut updates = log.subscribe();

    log.append(Speaker::Model, "after").await;

    let entry = updates.recv().await.unwrap();
    assert_eq!(entry.text, "after");
    assert_eq!(entry.display(), "Maestro: after");
}

#[test]
fn test_speaker_serialization() {
    assert_eq!(serde_json::to_string(&Speaker::User).unwrap(), "\"user\"");
    assert_eq!(Speaker::User.label(), "You");
    assert_eq!(Speaker::Model.label(), "Maestro");
}
