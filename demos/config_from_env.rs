//! Print the configuration resolved from the environment
//!
//! ```bash
//! CLINIC_FACILITY_ID=CLINIC_A OTHER_CLINIC_TCP_PORT=2575 \
//!     cargo run --example config_from_env -- clinic-b.local
//! ```

use clinic_referral::config::{ClinicEndpoint, ReferralConfig};
use clinic_referral::io::ReferralClient;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ReferralConfig::from_env();
    println!("facility:       {}", config.facility_id);
    println!("application:    {}", config.application);
    println!("default port:   {}", config.default_port);
    println!("listen address: {}", config.listen_addr);
    match config.ack_timeout {
        Some(timeout) => println!("ack timeout:    {:?}", timeout),
        None => println!("ack timeout:    none"),
    }
    println!("max frame size: {} bytes", config.max_frame_size);

    let client = ReferralClient::from_config(&config);
    println!("client sends as {}", client.facility_id());

    for arg in std::env::args().skip(1) {
        match ClinicEndpoint::parse(&arg, config.default_port) {
            Some(endpoint) => println!("destination {} -> {}", arg, endpoint),
            None => println!("destination {} is not a valid host[:port]", arg),
        }
    }
}
