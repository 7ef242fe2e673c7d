use anyhow::{Context, Result};
use async_nats::Client;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::messages::{LiveSetup, RelayEvent, SetupReply};
use super::transport::{ClientMessage, LiveLink, LiveTransport, TransportEvent};

/// Outbound messages buffered between the capture path and the NATS publisher
const OUTBOUND_QUEUE: usize = 64;
const INBOUND_QUEUE: usize = 256;

/// Live transport relayed over NATS
///
/// A relay service holds the actual model connection. Per session:
/// - `live.<id>.setup`  request/reply handshake carrying the `LiveSetup`
/// - `live.<id>.input`  realtime input published by us
/// - `live.<id>.events` server messages, close and error signals from the relay
/// - `live.<id>.close`  published by us when the session ends
pub struct NatsTransport {
    client: Client,
    handshake_timeout: Duration,
}

impl NatsTransport {
    /// Connect to NATS server
    pub async fn connect(url: &str, handshake_timeout: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            handshake_timeout,
        })
    }

    fn subject(session_id: &Uuid, leaf: &str) -> String {
        format!("live.{}.{}", session_id, leaf)
    }
}

#[async_trait::async_trait]
impl LiveTransport for NatsTransport {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveLink> {
        let session_id = Uuid::new_v4();

        // Subscribe before the handshake so no early server message is missed
        let mut events = self
            .client
            .subscribe(Self::subject(&session_id, "events"))
            .await
            .context("Failed to subscribe to session events")?;

        let payload = serde_json::to_vec(setup)?;
        let reply = tokio::time::timeout(
            self.handshake_timeout,
            self.client
                .request(Self::subject(&session_id, "setup"), payload.into()),
        )
        .await
        .context("Live session handshake timed out")?
        .context("Live session handshake failed")?;

        let reply: SetupReply =
            serde_json::from_slice(&reply.payload).context("Malformed handshake reply")?;
        if !reply.ok {
            anyhow::bail!(
                "Remote rejected session: {}",
                reply.error.unwrap_or_else(|| "no reason given".to_string())
            );
        }

        info!("Relay accepted live session {}", session_id);

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(OUTBOUND_QUEUE);
        let (inbound_tx, inbound_rx) = mpsc::channel::<TransportEvent>(INBOUND_QUEUE);

        // Outbound pump: realtime input until Close or every sender is gone
        let client = self.client.clone();
        let input_subject = Self::subject(&session_id, "input");
        let close_subject = Self::subject(&session_id, "close");
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    ClientMessage::RealtimeInput(input) => {
                        let payload = match serde_json::to_vec(&input) {
                            Ok(p) => p,
                            Err(e) => {
                                error!("Failed to serialize realtime input: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = client.publish(input_subject.clone(), payload.into()).await {
                            warn!("Failed to publish realtime input: {}", e);
                        }
                    }
                    ClientMessage::Close => break,
                }
            }

            if let Err(e) = client.publish(close_subject, Vec::<u8>::new().into()).await {
                warn!("Failed to publish session close: {}", e);
            }
            debug!("Outbound pump for {} stopped", session_id);
        });

        // Inbound pump: relay events until the subscriber ends or nobody listens
        tokio::spawn(async move {
            while let Some(msg) = events.next().await {
                let event = match serde_json::from_slice::<RelayEvent>(&msg.payload) {
                    Ok(RelayEvent::Message { message }) => TransportEvent::Message(message),
                    Ok(RelayEvent::Close { reason }) => TransportEvent::Closed { reason },
                    Ok(RelayEvent::Error { message }) => TransportEvent::Error(message),
                    Err(e) => {
                        warn!("Failed to parse relay event: {}", e);
                        continue;
                    }
                };

                let terminal = !matches!(event, TransportEvent::Message(_));
                if inbound_tx.send(event).await.is_err() || terminal {
                    break;
                }
            }
            debug!("Inbound pump for {} stopped", session_id);
        });

        Ok(LiveLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    fn name(&self) -> &str {
        "NATS relay"
    }
}
