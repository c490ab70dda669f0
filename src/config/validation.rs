//! Configuration validation
//!
//! Fail-fast validation of configuration invariants.

use super::Config;
use crate::util::{Location, Protocol};
use anyhow::{bail, Result};

/// Validate configuration invariants
pub fn validate(config: &Config) -> Result<()> {
    validate_gemini(config)?;
    validate_http(config)?;
    validate_tor(config)?;
    Ok(())
}

fn validate_location(name: &str, location: &str) -> Result<()> {
    let parsed = Location::parse(location);
    if parsed.address.is_empty() {
        bail!("{} cannot be empty", name);
    }
    if parsed.protocol == Protocol::Udp {
        bail!("{} cannot use udp: {}", name, location);
    }
    Ok(())
}

fn validate_gemini(config: &Config) -> Result<()> {
    validate_location("gemini.listening_location", &config.gemini.listening_location)?;

    for domain in &config.gemini.domain_names {
        if domain.trim().is_empty() {
            bail!("gemini.domain_names cannot contain an empty name");
        }
        if domain.contains(|c: char| c.is_whitespace() || c == '/') {
            bail!("Invalid domain name in gemini.domain_names: {:?}", domain);
        }
    }

    if config.gemini.tor.virtual_port == 0 {
        bail!("gemini.tor.virtual_port cannot be 0");
    }

    Ok(())
}

fn validate_http(config: &Config) -> Result<()> {
    if !config.http.enabled {
        return Ok(());
    }
    validate_location("http.listening_location", &config.http.listening_location)?;

    if config.http.tor.virtual_port == 0 {
        bail!("http.tor.virtual_port cannot be 0");
    }
    Ok(())
}

fn validate_tor(config: &Config) -> Result<()> {
    if !config.tor.enabled {
        return Ok(());
    }

    if config.http.enabled && config.http.tor.virtual_port == config.gemini.tor.virtual_port {
        bail!(
            "http.tor.virtual_port and gemini.tor.virtual_port cannot both be {}",
            config.gemini.tor.virtual_port
        );
    }

    if config.tor.reply_timeout_secs == 0 {
        bail!("tor.reply_timeout_secs cannot be 0");
    }

    // the onion service forwards to a fixed local address
    require_fixed_port("gemini.listening_location", &config.gemini.listening_location)?;
    if config.http.enabled {
        require_fixed_port("http.listening_location", &config.http.listening_location)?;
    }

    Ok(())
}

fn require_fixed_port(name: &str, location: &str) -> Result<()> {
    let parsed = Location::parse(location);
    if parsed.protocol == Protocol::Tcp && parsed.port().unwrap_or(0) == 0 {
        bail!("{} needs an explicit port when tor is enabled: {}", name, location);
    }
    Ok(())
}
