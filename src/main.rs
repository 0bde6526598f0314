//! onpc - command line remote for network AV receivers
//!
//! Connects to the configured receiver, or the first one discovery finds, and logs every state
//! change until interrupted.

use onpc_core::bus::{self, BusEvent, BusListener, SharedBus};
use onpc_core::config::{self, Config, ReceiverCache};
use onpc_core::discovery::{DiscoveryOptions, DiscoverySearch};
use onpc_core::protocol::ProtocolType;
use onpc_core::session::scripts::ShortcutScript;
use onpc_core::session::{Session, SessionOptions, SessionStatus};

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onpc_core=debug,onpc=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting onpc v{} ({})",
        env!("ONPC_VERSION"),
        env!("ONPC_GIT_SHA")
    );

    let config = config::load_config()?;
    tracing::info!("Configuration loaded from {}", config::get_config_dir().display());

    let bus = bus::create_bus();
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let script = match &config.session.script {
        Some(path) => {
            let xml = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read script {}", path.display()))?;
            Some(ShortcutScript::parse(&xml)?)
        }
        None => None,
    };

    let Some((protocol, host, port, zone)) =
        select_receiver(&config, script.as_ref(), &bus, &shutdown).await
    else {
        return Ok(());
    };

    let options = SessionOptions {
        zone,
        auto_power: config.session.auto_power,
        standby_on_exit: config.session.standby_on_exit,
        listening_mode_retry: config.session.listening_mode_retry,
        multiroom: config.session.multiroom,
        script,
        cache: Some(ReceiverCache::in_data_dir()),
        ..SessionOptions::default()
    };
    let listener = Arc::new(BusListener::new(bus.clone()));
    let session =
        Arc::new(Session::connect(protocol, &host, port, options, listener).await?);

    let events = tokio::spawn(log_events(bus.clone(), session.clone(), shutdown.clone()));

    if config.session.multiroom && protocol == ProtocolType::Iscp {
        // Companions announce themselves on the bus as discovery finds them.
        let search = DiscoverySearch::new(DiscoveryOptions {
            ssdp: false,
            ..DiscoveryOptions::from(&config.discovery)
        })
        .with_bus(bus.clone());
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = search.run(shutdown).await {
                tracing::debug!("Multiroom search: {}", e);
            }
        });
    }

    let mut status = session.watch_status();
    tokio::select! {
        _ = shutdown.cancelled() => session.stop(),
        _ = status.wait_for(|s| *s == SessionStatus::Stopped) => {}
    }
    session.wait().await;
    shutdown.cancel();
    let _ = events.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Configured receiver, script target or first discovered device.
async fn select_receiver(
    config: &Config,
    script: Option<&ShortcutScript>,
    bus: &SharedBus,
    shutdown: &CancellationToken,
) -> Option<(ProtocolType, String, u16, usize)> {
    if let Some(receiver) = &config.receiver {
        let (protocol, port) = receiver.endpoint();
        return Some((protocol, receiver.host.clone(), port, receiver.zone));
    }

    if let Some(target) = script.map(|s| s.target()) {
        if let Some(host) = &target.host {
            let port = target.port.unwrap_or(ProtocolType::Iscp.default_port());
            return Some((
                ProtocolType::from_port(port),
                host.clone(),
                port,
                target.zone.unwrap_or(0),
            ));
        }
    }

    let search = DiscoverySearch::new(DiscoveryOptions::from(&config.discovery))
        .with_favorites(config.favorites.clone())
        .with_bus(bus.clone());
    match search.run(shutdown.clone()).await {
        Ok(devices) => {
            for d in &devices {
                tracing::info!("Found {} at {} ({:?})", d.display_name(), d.key(), d.protocol);
            }
            devices
                .into_iter()
                .next()
                .map(|d| (d.protocol, d.host, d.port, 0))
        }
        Err(reason) => {
            tracing::error!("No receiver available: {}", reason);
            None
        }
    }
}

async fn log_events(bus: SharedBus, session: Arc<Session>, shutdown: CancellationToken) {
    let mut rx = bus.subscribe();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(BusEvent::StateChanged { changes, state, .. }) => {
                tracing::info!(
                    "{} changed {:?}: power={:?} input={:?} title={:?}",
                    state.device_name(),
                    changes,
                    state.power,
                    state.input,
                    state.title
                );
            }
            Ok(BusEvent::DeviceFound(device)) => {
                if let Err(e) = session.add_companion(device).await {
                    tracing::debug!("{}", e);
                }
            }
            Ok(BusEvent::DeviceDisconnected { host, port }) => {
                tracing::warn!("Lost connection to {}:{}", host, port);
            }
            Ok(BusEvent::ManagerStopped { host, port }) => {
                tracing::info!("Session {}:{} stopped", host, port);
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event log lagged by {} events", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
