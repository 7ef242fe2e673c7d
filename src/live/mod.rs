pub mod channel;
pub mod messages;
pub mod nats;
pub mod transport;

pub use channel::{classify, InboundEvent, SessionChannel, SessionHandle};
pub use messages::{LiveConfig, LiveSetup, Modality, RealtimeInput, ServerMessage};
pub use nats::NatsTransport;
pub use transport::{ClientMessage, LiveLink, LiveTransport, TransportEvent};
