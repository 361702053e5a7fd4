//! Demo client — mirrors the server's world and prints interpolated state.
//!
//! Dials `ENTSYNC_SERVER_URL` (default `ws://127.0.0.1:7373`), applies
//! incoming snapshots, and runs the interpolation system on a render-rate
//! tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use demo_components::{Health, Position, register_demo_components};
use entsync::{network_entities, new_interpolate_system, register_client};
use entsync_ecs::World;
use entsync_transport::WsClientTransport;

/// Interpolation/render tick period.
const TICK_INTERVAL: Duration = Duration::from_millis(16);

/// How often the mirrored state is printed.
const REPORT_EVERY: u32 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("demo_client=info".parse()?))
        .init();

    register_demo_components()?;

    let world = Arc::new(Mutex::new(World::new()));
    register_client(Arc::clone(&world));

    entsync_router::on_connect(|_client| {
        info!("connected to the server");
    });
    entsync_router::on_error(|_client, err| {
        error!(%err, "message error");
    });

    // Render loop: interpolate and report.
    tokio::spawn(async move {
        let mut interpolate = new_interpolate_system();
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        let mut ticks = 0u32;
        loop {
            ticker.tick().await;
            let mut world = world.lock().unwrap();
            interpolate(&mut world);

            ticks += 1;
            if ticks % REPORT_EVERY != 0 {
                continue;
            }
            for entity in network_entities(&world) {
                let position = world.get::<Position>(entity);
                let health = world.get::<Health>(entity);
                info!(%entity, ?position, ?health, "mirrored entity");
            }
        }
    });

    WsClientTransport::from_env().dial().await?;
    Ok(())
}
