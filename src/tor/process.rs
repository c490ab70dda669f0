//! Managed Tor daemon

use crate::config::TorConfig;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// `tor -f <torrc>` child, killed when dropped
pub struct TorProcess {
    child: Child,
}

impl TorProcess {
    /// Launch the configured tor binary with a fresh control port file
    pub fn spawn(config: &TorConfig) -> Result<Self> {
        remove_stale_control_port_file(&config.control_port_file_path)?;
        Self::spawn_program(&config.binary_path, &config.torrc_path)
    }

    pub fn spawn_program(program: &Path, torrc: &Path) -> Result<Self> {
        let child = Command::new(program)
            .arg("-f")
            .arg(torrc)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| {
                format!(
                    "Unable to start {}. Is tor installed on your system?",
                    program.display()
                )
            })?;

        info!(
            "Started {} (pid {}) with {:?}",
            program.display(),
            child.id().unwrap_or_default(),
            torrc
        );
        Ok(Self { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the daemon and reap it
    pub async fn shutdown(mut self) {
        match self.child.kill().await {
            Ok(()) => debug!("Tor daemon stopped"),
            Err(e) => warn!("Failed to stop Tor daemon: {}", e),
        }
    }
}

/// Delete the control port file a killed daemon left behind
///
/// Tor only rewrites it once its control port is open, so an old file would
/// point the client at a port nobody listens on.
pub fn remove_stale_control_port_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale control port file {:?}", path);
            Ok(())
        },
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e)
            .with_context(|| format!("Unable to remove stale control port file {:?}", path)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let result = TorProcess::spawn_program(Path::new("bergelmir-no-such-tor"), Path::new("torrc"));
        let err = result.err().unwrap();
        assert!(format!("{:#}", err).contains("Is tor installed"));
    }

    #[tokio::test]
    async fn test_shutdown_kills_child() {
        // sleep rejects -f and exits; shutdown still reaps it
        let process = TorProcess::spawn_program(Path::new("sleep"), Path::new("60")).unwrap();
        assert!(process.id().is_some());
        process.shutdown().await;
    }

    #[test]
    fn test_stale_control_port_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control_port");
        std::fs::write(&path, "PORT=127.0.0.1:1\n").unwrap();

        remove_stale_control_port_file(&path).unwrap();
        assert!(!path.exists());
        remove_stale_control_port_file(&path).unwrap();
    }
}
