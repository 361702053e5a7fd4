//! Demo server — owns one orbiting entity and broadcasts snapshots.
//!
//! Listens on `ENTSYNC_LISTEN_ADDR` (default `127.0.0.1:7373`). Run the demo
//! client against it to watch the entity move.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use demo_components::{Health, Position, register_demo_components};
use entsync::{SyncSpec, do_sync, network_sync, use_sync_world};
use entsync_ecs::World;
use entsync_transport::WsServerTransport;

/// Snapshot broadcast period.
const SYNC_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("demo_server=info".parse()?))
        .init();

    register_demo_components()?;

    let world = Arc::new(Mutex::new(World::new()));
    let entity = {
        let mut world = world.lock().unwrap();
        let entity = world.spawn();
        world.insert(entity, Position::new(1.0, 0.0))?;
        world.insert(entity, Health::full(20))?;
        let network_id = network_sync(
            &mut world,
            entity,
            SyncSpec::new().interpolated::<Position>().component::<Health>(),
        )?;
        info!(%entity, %network_id, "entity marked for sync");
        entity
    };
    use_sync_world(Arc::clone(&world));

    entsync_router::on_connect(|client| {
        info!(client = client.id(), "peer connected");
    });
    entsync_router::on_disconnect(|client, err| {
        info!(client = client.id(), ?err, "peer disconnected");
    });
    entsync_router::on_error(|client, err| {
        error!(client = client.id(), %err, "message error");
    });

    // Game loop: move the entity along a circle and ship snapshots.
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        let mut angle = 0.0f32;
        loop {
            ticker.tick().await;
            {
                let mut world = world.lock().unwrap();
                if let Some(position) = world.get_mut::<Position>(entity) {
                    angle += 0.05;
                    *position = Position::new(angle.cos() * 5.0, angle.sin() * 5.0);
                }
            }
            if let Err(err) = do_sync().await {
                error!(%err, "sync failed");
            }
        }
    });

    WsServerTransport::from_env().serve().await?;
    Ok(())
}
