//! Start-up sequencing and task supervision
//!
//! Tor first, then the certificate for the final domain set, then the
//! listeners. Every listener is bound before any of them is spawned, so a
//! fatal error leaves nothing open. All tokio::spawn calls for long-lived
//! tasks live here.

use crate::config::Config;
use crate::content::ContentResolver;
use crate::gemini::{self, GeminiServer, ServerContext, VirtualHostTable};
use crate::http::HttpGateway;
use crate::state::StartupContext;
use crate::tls::{build_server_tls_config, CertificateManager};
use crate::tor::{provision_onion_service, TorProcess};
use crate::util::{BoundListener, Location};
use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{error, info};

/// Listeners and the managed Tor daemon, once start-up has succeeded
pub struct Running {
    context: StartupContext,
    gemini_port: Option<u16>,
    http_port: Option<u16>,
    tor: Option<TorProcess>,
    tasks: JoinSet<(&'static str, Result<()>)>,
}

impl Running {
    pub fn onion_address(&self) -> Option<&str> {
        self.context.onion_address.as_deref()
    }

    /// Bound Gemini TCP port
    pub fn gemini_port(&self) -> Option<u16> {
        self.gemini_port
    }

    /// Bound HTTP TCP port, when the gateway is enabled
    pub fn http_port(&self) -> Option<u16> {
        self.http_port
    }

    /// Wait until a listener task stops
    pub async fn wait(&mut self) {
        match self.tasks.join_next().await {
            Some(Ok((name, Ok(())))) => error!("{} listener exited", name),
            Some(Ok((name, Err(e)))) => error!("{} listener failed: {:#}", name, e),
            Some(Err(e)) => error!("Listener task panicked: {}", e),
            None => std::future::pending::<()>().await,
        }
    }

    /// Stop listeners and the Tor daemon
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        if let Some(tor) = self.tor.take() {
            tor.shutdown().await;
        }
        info!("Shutdown complete");
    }
}

/// Run the start-up sequence and spawn the listeners
pub async fn start(config: &Config) -> Result<Running> {
    let tor = if config.tor.enabled && config.tor.manage_daemon {
        Some(TorProcess::spawn(&config.tor)?)
    } else {
        None
    };

    let onion_address = if config.tor.enabled {
        let onion = provision_onion_service(config)
            .await
            .context("Failed to provision the onion service")?;
        info!("Onion service available at {}", onion);
        Some(onion)
    } else {
        None
    };
    let context = StartupContext::new(onion_address);

    let domains = context.domains(config);
    info!("Serving domains: {}", domains.as_slice().join(", "));

    let certificate = CertificateManager::from_config(&config.gemini.tls).load_or_create(&domains)?;
    let tls = build_server_tls_config(&certificate)?;

    let gateway = if config.http.enabled {
        Some(HttpGateway::from_config(config)?)
    } else {
        None
    };

    let gemini_listener =
        BoundListener::bind(&Location::parse(&config.gemini.listening_location)).await?;
    let gemini_port = gemini_listener.local_port();
    let http_listener = match &gateway {
        Some(_) => Some(BoundListener::bind(&Location::parse(&config.http.listening_location)).await?),
        None => None,
    };
    let http_port = http_listener.as_ref().and_then(BoundListener::local_port);

    let hosts = VirtualHostTable::build(
        &domains,
        gemini_port.unwrap_or(gemini::DEFAULT_PORT),
        context.onion_address.as_deref(),
        config.gemini.tor.virtual_port,
    );
    let server = GeminiServer::new(
        gemini_listener,
        tls,
        ServerContext {
            hosts,
            resolver: ContentResolver::from_config(config),
        },
    );

    let mut tasks = JoinSet::new();
    tasks.spawn(async move { ("Gemini", server.run().await) });
    if let (Some(gateway), Some(listener)) = (gateway, http_listener) {
        tasks.spawn(async move { ("HTTP", gateway.run(listener).await) });
    }

    Ok(Running {
        context,
        gemini_port,
        http_port,
        tor,
        tasks,
    })
}

/// Serve until SIGINT/SIGTERM or a listener stops
pub async fn run(config: Config) -> Result<()> {
    let mut running = start(&config).await?;

    tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            info!("Shutdown signal received");
        }
        () = running.wait() => {}
    }

    running.shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("Unable to install SIGTERM handler")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("Unable to listen for Ctrl-C")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Unable to listen for Ctrl-C")?;
    Ok(())
}
