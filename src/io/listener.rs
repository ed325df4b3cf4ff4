//! Inbound referral listener
//!
//! Accepts connections from other clinics, hands each received message to an
//! [`InboundMessageHandler`] and answers with an acknowledgment.

use crate::config::ReferralConfig;
use crate::error::{ReferralError, Result};
use crate::inbound::{InboundMessage, InboundMessageHandler, InboundOutcome};
use crate::io::framing::{write_frame, FrameReader};
use crate::protocol::header::{ControlIdGenerator, MessageCategory, MessageHeader};
use crate::protocol::message::ClinicalMessage;
use crate::protocol::types::{build_ack, AckOutcome};
use crate::store::PatientStore;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, trace, warn};

/// Values every connection needs to build acknowledgments
#[derive(Debug)]
struct AckSettings {
    facility_id: String,
    application: String,
    max_frame_size: usize,
    control_ids: ControlIdGenerator,
}

/// TCP listener for referrals from other clinics
///
/// # Examples
///
/// ```no_run
/// use clinic_referral::config::ReferralConfig;
/// use clinic_referral::inbound::InboundMessageHandler;
/// use clinic_referral::io::ReferralListener;
/// use clinic_referral::store::InMemoryPatientStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ReferralConfig::from_env();
///     let listener = ReferralListener::bind(&config).await?;
///     let handler = Arc::new(InboundMessageHandler::new(InMemoryPatientStore::new()));
///     listener.run(handler).await?;
///     Ok(())
/// }
/// ```
pub struct ReferralListener {
    listener: TcpListener,
    settings: Arc<AckSettings>,
}

impl ReferralListener {
    /// Bind to `config.listen_addr`
    ///
    /// Acknowledgments are sent as `config.facility_id` / `config.application`.
    ///
    /// # Errors
    ///
    /// - [`ReferralError::Io`] - Failed to bind
    pub async fn bind(config: &ReferralConfig) -> Result<Self> {
        info!(addr = %config.listen_addr, "Binding referral listener");
        let listener = TcpListener::bind(&config.listen_addr).await?;
        info!(
            local_addr = %listener.local_addr()?,
            facility = %config.facility_id,
            "Referral listener ready"
        );
        Ok(ReferralListener {
            listener,
            settings: Arc::new(AckSettings {
                facility_id: config.facility_id.clone(),
                application: config.application.clone(),
                max_frame_size: config.max_frame_size,
                control_ids: ControlIdGenerator::new(),
            }),
        })
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection
    ///
    /// # Errors
    ///
    /// - [`ReferralError::Io`] - Failed to accept connection
    pub async fn accept(&self) -> Result<ReferralConnection> {
        trace!("Waiting for clinic connection");
        let (stream, peer) = self.listener.accept().await?;
        info!(peer_addr = %peer, "Clinic connected");
        Ok(ReferralConnection {
            stream,
            peer,
            settings: Arc::clone(&self.settings),
        })
    }

    /// Accept connections forever, serving each on its own task
    ///
    /// Only returns if accepting fails in a way that is not tied to a single
    /// connection.
    pub async fn run<S>(self, handler: Arc<InboundMessageHandler<S>>) -> Result<()>
    where
        S: PatientStore + 'static,
    {
        loop {
            let connection = match self.accept().await {
                Ok(connection) => connection,
                Err(ReferralError::Io(e)) if is_transient(&e) => {
                    warn!(error = %e, "Accept failed, continuing");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let peer = connection.peer_addr();
                if let Err(e) = connection.serve(&handler).await {
                    warn!(peer_addr = %peer, error = %e, "Connection ended with error");
                }
            });
        }
    }
}

fn is_transient(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
    )
}

/// One accepted clinic connection
pub struct ReferralConnection {
    stream: TcpStream,
    peer: SocketAddr,
    settings: Arc<AckSettings>,
}

impl ReferralConnection {
    /// Address of the connected clinic
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Serve frames until the peer closes the connection
    ///
    /// Every frame except an acknowledgment gets exactly one acknowledgment
    /// back: accept for created or ignored messages, error with the failure
    /// text otherwise, reject when the frame could not be parsed.
    ///
    /// # Errors
    ///
    /// - [`ReferralError::Io`] - Read/write failed or the stream ended inside a frame
    /// - [`ReferralError::FrameTooLarge`] - The peer sent an oversized frame
    pub async fn serve<S: PatientStore>(self, handler: &InboundMessageHandler<S>) -> Result<()> {
        let ReferralConnection {
            stream,
            peer,
            settings,
        } = self;
        let (reader, mut writer) = stream.into_split();
        let mut frames = FrameReader::new(reader, settings.max_frame_size);

        while let Some(frame) = frames.read_frame().await? {
            let Some(ack) = respond(&settings, handler, peer, frame).await? else {
                continue;
            };
            write_frame(&mut writer, &ack.encode()?).await?;
            trace!(peer_addr = %peer, control_id = %ack.control_id(), "Acknowledgment sent");
        }

        debug!(peer_addr = %peer, "Clinic disconnected");
        Ok(())
    }
}

/// Handle one frame and build the acknowledgment, if one is due
async fn respond<S: PatientStore>(
    settings: &AckSettings,
    handler: &InboundMessageHandler<S>,
    peer: SocketAddr,
    frame: Bytes,
) -> Result<Option<ClinicalMessage>> {
    let header = match ClinicalMessage::decode(&frame) {
        Ok(message) => message.header().clone(),
        Err(e) => {
            warn!(peer_addr = %peer, error = %e, "Rejecting unparsable frame");
            return ack(settings, None, AckOutcome::Reject(&e.to_string())).map(Some);
        }
    };

    if header.category() == &MessageCategory::Ack {
        debug!(
            peer_addr = %peer,
            control_id = %header.control_id,
            "Ignoring unsolicited acknowledgment"
        );
        return Ok(None);
    }

    let message = InboundMessage {
        sender_facility: header.sending_facility.clone(),
        category: header.category().clone(),
        payload: Some(frame),
    };

    let reply = match handler.handle(message).await {
        Ok(InboundOutcome::Created(_)) | Ok(InboundOutcome::Ignored) => {
            ack(settings, Some(&header), AckOutcome::Accept)?
        }
        Err(e) => {
            debug!(
                peer_addr = %peer,
                control_id = %header.control_id,
                error = %e,
                "Referral not accepted"
            );
            ack(settings, Some(&header), AckOutcome::Error(&e.to_string()))?
        }
    };
    Ok(Some(reply))
}

fn ack(
    settings: &AckSettings,
    request: Option<&MessageHeader>,
    outcome: AckOutcome<'_>,
) -> Result<ClinicalMessage> {
    build_ack(
        request,
        outcome,
        &settings.application,
        &settings.facility_id,
        &settings.control_ids.next_id(),
    )
}
