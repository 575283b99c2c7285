use std::sync::Arc;
use std::time::Duration;

use qrcode::render::unicode;
use qrcode::QrCode;
use tokio::sync::broadcast;
use tracing::{info, warn};
use wabridge_actions::{CapabilityGate, GroupAddWorkflow, Invoker};
use wabridge_core::{Config, Paths, SessionEvent};
use wabridge_session::{DriverClient, EventForwarder, SessionHandle};

use super::gateway::{router, GatewayState};

fn render_qr(payload: &str) -> Option<String> {
    let qr = QrCode::new(payload.as_bytes()).ok()?;
    Some(
        qr.render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Dark)
            .light_color(unicode::Dense1x2::Light)
            .quiet_zone(true)
            .build(),
    )
}

/// Print every pairing challenge to the terminal until shutdown.
async fn show_qr_codes(
    mut events: broadcast::Receiver<SessionEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(SessionEvent::Qr { qr }) => match render_qr(&qr) {
                    Some(image) => println!("Scan this QR code with the phone to link the session:\n{}", image),
                    None => warn!("Received a QR challenge that cannot be rendered"),
                },
                Ok(SessionEvent::Authenticated) => println!("✓ Session authenticated"),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

pub async fn run(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;

    let host = host.unwrap_or_else(|| config.gateway.host.clone());
    let port = port.unwrap_or(config.gateway.port);

    let capabilities_path = config.capabilities_path(&paths);
    let gate = CapabilityGate::load(&capabilities_path).with_allow_all(config.capabilities.allow_all);
    if gate.allow_all() {
        warn!("Capability gate disabled: every scope and method may be called");
    }

    // ── Session and its consumers ──
    let driver = Arc::new(DriverClient::new(config.driver.clone()));
    let session = Arc::new(SessionHandle::new(driver.clone()));
    let forwarder = EventForwarder::new(
        Duration::from_secs(config.forwarder.timeout_secs),
        config.forwarder.callback_url.clone(),
    );
    let group_add = Arc::new(GroupAddWorkflow::new(&config.groups));
    let invoker = Arc::new(Invoker::new(session.clone(), Arc::new(gate), group_add.clone()));

    // ── Create shutdown channel ──
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Subscribers attach before the driver connects so no early event is missed.
    let tracker_handle = tokio::spawn(
        session
            .clone()
            .track(session.subscribe(), shutdown_tx.subscribe()),
    );
    let forwarder_handle = tokio::spawn(
        forwarder
            .clone()
            .run(session.subscribe(), shutdown_tx.subscribe()),
    );
    let qr_handle = tokio::spawn(show_qr_codes(session.subscribe(), shutdown_tx.subscribe()));
    let driver_handle = tokio::spawn(driver.clone().run_loop(shutdown_tx.subscribe()));

    let state = GatewayState {
        session,
        invoker,
        group_add,
        forwarder,
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?,
        invite_base_url: config.groups.invite_base_url.clone(),
        api_token: config.api_token().map(str::to_string),
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, driver_url = %config.driver.url, "wabridge listening");
    if config.api_token().is_none() {
        warn!("No API token configured: the HTTP surface is unauthenticated");
    }

    let http_shutdown_rx = shutdown_tx.subscribe();
    let http_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = http_shutdown_rx;
                let _ = rx.recv().await;
            })
            .await
            .ok();
    });

    // ── Wait for shutdown signal ──
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(());

    let handles: Vec<(&str, tokio::task::JoinHandle<()>)> = vec![
        ("http_server", http_handle),
        ("driver", driver_handle),
        ("lifecycle", tracker_handle),
        ("forwarder", forwarder_handle),
        ("qr", qr_handle),
    ];
    for (name, handle) in handles {
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
            Err(_) => warn!(task = name, "Task did not stop in time"),
        }
    }

    info!("wabridge stopped");
    Ok(())
}
