//! Outbound referral client
//!
//! Each referral opens its own connection, sends one framed message, waits for
//! one framed reply on the same connection and closes the connection. There is
//! no pooling, no retry and no state shared between concurrent referrals other
//! than the control id sequence.

use crate::config::{ClinicEndpoint, ReferralConfig, DEFAULT_APPLICATION, DEFAULT_MAX_FRAME_SIZE};
use crate::error::{ReferralError, Result};
use crate::io::framing::{write_frame, FrameReader};
use crate::patient::Patient;
use crate::protocol::header::ControlIdGenerator;
use crate::protocol::message::ClinicalMessage;
use crate::protocol::types::{
    acknowledged_control_id, build_referral, interpret_ack, AcknowledgmentResult, ReferralRequest,
};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Reason reported when the reply cannot be decoded
pub const MALFORMED_ACK: &str = "malformed acknowledgment";

// ============================================================================
// Builder states
// ============================================================================

/// Facility not yet configured
pub struct Unspecified;

/// Facility configured; the builder can produce a client
pub struct FacilityConfigured {
    facility_id: String,
}

/// Type-state builder for [`ReferralClient`]
///
/// `build()` only exists once the sending facility is known.
///
/// # Examples
///
/// ```
/// use clinic_referral::io::ReferralClient;
/// use std::time::Duration;
///
/// let client = ReferralClient::builder()
///     .facility("CLINIC_A")
///     .ack_timeout(Duration::from_secs(30))
///     .build();
/// assert_eq!(client.facility_id(), "CLINIC_A");
/// ```
pub struct ReferralClientBuilder<State = Unspecified> {
    state: State,
    application: String,
    ack_timeout: Option<Duration>,
    max_frame_size: usize,
    control_ids: Option<ControlIdGenerator>,
}

impl ReferralClientBuilder<Unspecified> {
    /// Start a builder with default settings
    pub fn new() -> Self {
        ReferralClientBuilder {
            state: Unspecified,
            application: DEFAULT_APPLICATION.to_string(),
            ack_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            control_ids: None,
        }
    }

    /// Set this clinic's facility id
    pub fn facility(self, facility_id: impl Into<String>) -> ReferralClientBuilder<FacilityConfigured> {
        ReferralClientBuilder {
            state: FacilityConfigured {
                facility_id: facility_id.into(),
            },
            application: self.application,
            ack_timeout: self.ack_timeout,
            max_frame_size: self.max_frame_size,
            control_ids: self.control_ids,
        }
    }
}

impl Default for ReferralClientBuilder<Unspecified> {
    fn default() -> Self {
        Self::new()
    }
}

impl<State> ReferralClientBuilder<State> {
    /// Sending application name
    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// Bound each send/await-ack exchange; unset means wait indefinitely
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    /// Maximum accepted acknowledgment size
    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Use a fixed control id prefix instead of the creation timestamp
    pub fn control_id_prefix(mut self, prefix: &str) -> Self {
        self.control_ids = Some(ControlIdGenerator::with_prefix(prefix));
        self
    }
}

impl ReferralClientBuilder<FacilityConfigured> {
    /// Build the client
    pub fn build(self) -> ReferralClient {
        ReferralClient {
            facility_id: self.state.facility_id,
            application: self.application,
            ack_timeout: self.ack_timeout,
            max_frame_size: self.max_frame_size,
            control_ids: self.control_ids.unwrap_or_default(),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Sends referrals to remote clinics
pub struct ReferralClient {
    facility_id: String,
    application: String,
    ack_timeout: Option<Duration>,
    max_frame_size: usize,
    control_ids: ControlIdGenerator,
}

impl ReferralClient {
    /// Start a [`ReferralClientBuilder`]
    pub fn builder() -> ReferralClientBuilder<Unspecified> {
        ReferralClientBuilder::new()
    }

    /// Client configured from a resolved [`ReferralConfig`]
    pub fn from_config(config: &ReferralConfig) -> Self {
        let mut builder = Self::builder()
            .facility(config.facility_id.clone())
            .application(config.application.clone())
            .max_frame_size(config.max_frame_size);
        if let Some(timeout) = config.ack_timeout {
            builder = builder.ack_timeout(timeout);
        }
        builder.build()
    }

    /// This clinic's facility id
    pub fn facility_id(&self) -> &str {
        &self.facility_id
    }

    /// Configured exchange timeout
    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout
    }

    /// Build the referral request and message without sending anything
    ///
    /// # Errors
    /// [`ReferralError::Encoding`] if the patient record cannot be rendered.
    pub fn prepare(
        &self,
        patient: &Patient,
        destination_clinic_id: &str,
    ) -> Result<(ReferralRequest, ClinicalMessage)> {
        let request = ReferralRequest::new(
            patient,
            &self.facility_id,
            destination_clinic_id,
            &self.control_ids,
        );
        let message = build_referral(patient, &request, &self.application)?;
        Ok((request, message))
    }

    /// Refer `patient` to the clinic listening at `endpoint`
    ///
    /// # Returns
    /// - `Accepted` when the reply carries no error
    /// - `Rejected(text)` when the reply carries an error segment
    /// - `TransportFailed(reason)` on connection failure, timeout, or an
    ///   unreadable reply
    ///
    /// # Errors
    /// Only [`ReferralError::Encoding`];
    /// nothing has been sent in that case.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use clinic_referral::config::ClinicEndpoint;
    /// use clinic_referral::io::ReferralClient;
    /// use clinic_referral::patient::Patient;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = ReferralClient::builder().facility("CLINIC_A").build();
    ///     let patient = Patient::new("p-1", "john", "doe", "j@d.com");
    ///     let endpoint = ClinicEndpoint::new("localhost", 7777);
    ///
    ///     let result = client.send_referral(&patient, "CLINIC_B", &endpoint).await?;
    ///     println!("referral {}", result);
    ///     Ok(())
    /// }
    /// ```
    pub async fn send_referral(
        &self,
        patient: &Patient,
        destination_clinic_id: &str,
        endpoint: &ClinicEndpoint,
    ) -> Result<AcknowledgmentResult> {
        let (_, result) = self.dispatch(patient, destination_clinic_id, endpoint).await?;
        Ok(result)
    }

    /// [`send_referral`](Self::send_referral) collapsed into a `Result`
    ///
    /// Returns the request metadata on acceptance;
    /// [`ReferralError::Rejected`] and [`ReferralError::TransportFailed`] stay
    /// distinct.
    pub async fn refer(
        &self,
        patient: &Patient,
        destination_clinic_id: &str,
        endpoint: &ClinicEndpoint,
    ) -> Result<ReferralRequest> {
        let (request, result) = self.dispatch(patient, destination_clinic_id, endpoint).await?;
        result.into_result()?;
        Ok(request)
    }

    async fn dispatch(
        &self,
        patient: &Patient,
        destination_clinic_id: &str,
        endpoint: &ClinicEndpoint,
    ) -> Result<(ReferralRequest, AcknowledgmentResult)> {
        let (request, message) = self.prepare(patient, destination_clinic_id)?;
        let payload = message.encode()?;

        info!(
            control_id = %request.control_id,
            destination = %request.destination_clinic_id,
            endpoint = %endpoint,
            "Sending referral"
        );

        let result = match self.ack_timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(&request, &payload, endpoint))
                .await
                .unwrap_or_else(|_| {
                    AcknowledgmentResult::TransportFailed(format!(
                        "no acknowledgment within {:?}",
                        limit
                    ))
                }),
            None => self.exchange(&request, &payload, endpoint).await,
        };

        match &result {
            AcknowledgmentResult::Accepted => {
                info!(control_id = %request.control_id, "Referral accepted")
            }
            AcknowledgmentResult::Rejected(reason) => {
                warn!(control_id = %request.control_id, reason = %reason, "Referral rejected")
            }
            AcknowledgmentResult::TransportFailed(reason) => {
                warn!(control_id = %request.control_id, reason = %reason, "Referral transport failed")
            }
        }

        Ok((request, result))
    }

    /// One connection: connect, send, await reply, close
    ///
    /// The stream is owned by this future, so it is closed on every exit path,
    /// including cancellation by the timeout.
    async fn exchange(
        &self,
        request: &ReferralRequest,
        payload: &[u8],
        endpoint: &ClinicEndpoint,
    ) -> AcknowledgmentResult {
        let mut stream = match TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await {
            Ok(stream) => stream,
            Err(e) => {
                return AcknowledgmentResult::TransportFailed(format!(
                    "connect to {} failed: {}",
                    endpoint, e
                ))
            }
        };
        debug!(endpoint = %endpoint, control_id = %request.control_id, "Connected");

        if let Err(e) = write_frame(&mut stream, payload).await {
            return AcknowledgmentResult::TransportFailed(format!("send failed: {}", e));
        }
        debug!(control_id = %request.control_id, bytes_sent = payload.len(), "Referral sent, awaiting acknowledgment");

        let reply = {
            let mut frames = FrameReader::new(&mut stream, self.max_frame_size);
            frames.read_frame().await
        };
        let _ = stream.shutdown().await;

        let reply = match reply {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                return AcknowledgmentResult::TransportFailed(
                    "connection closed before acknowledgment".to_string(),
                )
            }
            Err(ReferralError::FrameTooLarge { .. }) => {
                return AcknowledgmentResult::TransportFailed(MALFORMED_ACK.to_string())
            }
            Err(e) => {
                return AcknowledgmentResult::TransportFailed(format!(
                    "receive failed: {}",
                    e
                ))
            }
        };

        let ack = match ClinicalMessage::decode(&reply) {
            Ok(ack) => ack,
            Err(e) => {
                debug!(error = %e, "Acknowledgment did not decode");
                return AcknowledgmentResult::TransportFailed(MALFORMED_ACK.to_string());
            }
        };

        if let Some(acknowledged) = acknowledged_control_id(&ack) {
            if acknowledged != request.control_id {
                return AcknowledgmentResult::TransportFailed(
                    "acknowledgment control id mismatch".to_string(),
                );
            }
        }

        debug!(control_id = %request.control_id, ack_control_id = %ack.control_id(), "Acknowledgment received");
        interpret_ack(&ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn patient() -> Patient {
        Patient::new("p-1", "john", "doe", "j@d.com")
    }

    #[test]
    fn test_from_config() {
        let mut config = ReferralConfig::new("CLINIC_A");
        config.ack_timeout = Some(Duration::from_secs(5));
        let client = ReferralClient::from_config(&config);
        assert_eq!(client.facility_id(), "CLINIC_A");
        assert_eq!(client.ack_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_prepare_uses_fresh_control_ids() {
        let client = ReferralClient::builder()
            .facility("CLINIC_A")
            .control_id_prefix("C")
            .build();
        let (first, _) = client.prepare(&patient(), "CLINIC_B").unwrap();
        let (second, msg) = client.prepare(&patient(), "CLINIC_B").unwrap();
        assert_eq!(first.control_id, "C000001");
        assert_eq!(second.control_id, "C000002");
        assert_eq!(msg.control_id(), "C000002");
        assert_eq!(msg.header().sending_facility, "CLINIC_A");
    }

    #[tokio::test]
    async fn test_encoding_error_is_returned_before_connecting() {
        let client = ReferralClient::builder().facility("CLINIC_A").build();
        let mut bad = patient();
        bad.email.clear();
        // Nothing listens here; an encoding error must win over the transport
        let endpoint = ClinicEndpoint::new("127.0.0.1", 1);
        let err = client.send_referral(&bad, "CLINIC_B", &endpoint).await.unwrap_err();
        assert!(matches!(err, ReferralError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ReferralClient::builder().facility("CLINIC_A").build();
        let endpoint = ClinicEndpoint::new("127.0.0.1", addr.port());
        let result = client.send_referral(&patient(), "CLINIC_B", &endpoint).await.unwrap();
        assert!(matches!(result, AcknowledgmentResult::TransportFailed(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and read, never reply
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frames = FrameReader::new(&mut stream, 1024 * 1024);
            let _ = frames.read_frame().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = ReferralClient::builder()
            .facility("CLINIC_A")
            .ack_timeout(Duration::from_millis(100))
            .build();
        let endpoint = ClinicEndpoint::new("127.0.0.1", addr.port());
        let result = client.send_referral(&patient(), "CLINIC_B", &endpoint).await.unwrap();
        match result {
            AcknowledgmentResult::TransportFailed(reason) => {
                assert!(reason.contains("no acknowledgment"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
