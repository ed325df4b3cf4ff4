//! Refer a patient to a local listener, then refer the same patient again
//!
//! The second referral is declined because the receiving clinic already has
//! a patient with that email.
//!
//! ```bash
//! RUST_LOG=clinic_referral=debug cargo run --example referral_roundtrip
//! ```

use chrono::NaiveDate;
use clinic_referral::config::{ClinicEndpoint, ReferralConfig};
use clinic_referral::inbound::InboundMessageHandler;
use clinic_referral::io::{ReferralClient, ReferralListener};
use clinic_referral::patient::Patient;
use clinic_referral::store::InMemoryPatientStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Receiving clinic
    let mut config = ReferralConfig::new("CLINIC_B");
    config.listen_addr = "127.0.0.1:0".to_string();
    let listener = ReferralListener::bind(&config).await?;
    let endpoint = ClinicEndpoint::new("127.0.0.1", listener.local_addr()?.port());
    let handler = Arc::new(InboundMessageHandler::new(InMemoryPatientStore::new()));
    tokio::spawn(listener.run(Arc::clone(&handler)));

    // Referring clinic
    let client = ReferralClient::builder()
        .facility("CLINIC_A")
        .ack_timeout(Duration::from_secs(10))
        .build();

    let mut patient = Patient::new("A-1001", "john", "doe", "j@d.com");
    patient.birthdate = NaiveDate::from_ymd_opt(1990, 1, 1);

    for attempt in 1..=2 {
        let result = client.send_referral(&patient, "CLINIC_B", &endpoint).await?;
        println!("Referral #{}: {}", attempt, result);
    }

    for stored in handler.store().list().await {
        info!(patient_id = %stored.id, "Stored at CLINIC_B");
        println!("CLINIC_B has {} {} ({})", stored.first_name, stored.last_name, stored.id);
    }

    Ok(())
}
