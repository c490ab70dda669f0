//! Tor daemon interaction
//!
//! Control-port authentication and onion service provisioning, plus the
//! optional managed `tor` child process. Tor is treated as a black box.

pub mod control;
pub mod process;

pub use control::{
    resolve_control_address, ControlAddress, OnionPort, SessionState, TorController,
};
pub use process::TorProcess;

use crate::config::Config;
use crate::crypto::resolve_key;
use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

/// Onion ports for the Gemini listener and, when enabled, the HTTP gateway
pub fn onion_ports(config: &Config) -> Vec<OnionPort> {
    let mut ports = vec![OnionPort::for_listener(
        config.gemini.tor.virtual_port,
        &config.gemini.listening_location,
    )];
    if config.http.enabled {
        ports.push(OnionPort::for_listener(
            config.http.tor.virtual_port,
            &config.http.listening_location,
        ));
    }
    ports
}

/// Authenticate to Tor and publish the onion service
///
/// Returns the onion address Tor reports. Any failure is fatal to start-up.
pub async fn provision_onion_service(config: &Config) -> Result<String> {
    let tor = &config.tor;
    let address =
        resolve_control_address(&tor.control_port_file_path, &tor.default_control_address).await;
    let mut controller =
        TorController::connect(&address, Duration::from_secs(tor.reply_timeout_secs)).await?;
    info!("Connected to Tor control port {}", address);

    controller
        .authenticate(&tor.control_auth_cookie_path)
        .await?;

    let key = resolve_key(&tor.hidden_service_private_key_path)?;
    let onion = controller.add_onion(&key, &onion_ports(config)).await?;

    if let Some(local) = key.onion_address() {
        if local != onion {
            warn!(
                "Tor reported {} but the generated key derives {}, using Tor's",
                onion, local
            );
        }
    }

    Ok(onion)
}
