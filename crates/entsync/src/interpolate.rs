//! Client-side interpolation of history-backed components.
//!
//! Each tick, the system walks every entity that carries a network identity,
//! an interpolation list, and a history record, and writes a smoothed
//! current value into each listed component slot.
//!
//! The blend deliberately runs `lerp(next, delayed, t)` — from the sample
//! one step behind the newest toward the delay-adjusted newest — rather
//! than the textbook previous/next pair. Indexing the "present" back by the
//! estimated delay makes slow connections smooth over proportionally longer
//! windows.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use entsync_codec::InterpId;
use entsync_ecs::World;

use crate::client::{InterpHistory, TimedSample};
use crate::registry::INTERP;
use crate::snapshot::{InterpData, NetworkId};

// ── Delay estimation ────────────────────────────────────────────────────

/// Running estimate of the end-to-end snapshot delay.
///
/// Accumulates inter-snapshot intervals forever and divides by the count, so
/// the average converges on the long-term mean. The derived `delay` is a
/// whole-second index into the history buffer: how many samples back to
/// treat as the effective newest value.
struct DelayEstimator {
    requests: u64,
    total_latency: Duration,
    delay: usize,
    last_snapshot: Instant,
}

static ESTIMATOR: LazyLock<Mutex<DelayEstimator>> = LazyLock::new(|| {
    Mutex::new(DelayEstimator {
        requests: 0,
        total_latency: Duration::ZERO,
        delay: 0,
        last_snapshot: Instant::now(),
    })
});

/// Fold one snapshot arrival into the delay estimate. Called once per
/// received snapshot.
pub(crate) fn record_snapshot(now: Instant) {
    let mut estimator = ESTIMATOR.lock().unwrap();
    estimator.requests += 1;
    let elapsed = now.saturating_duration_since(estimator.last_snapshot);
    estimator.total_latency += elapsed;
    let avg_latency = estimator.total_latency.as_secs_f64() / estimator.requests as f64;
    estimator.delay = avg_latency.floor() as usize;
    estimator.last_snapshot = now;
}

fn current_delay() -> usize {
    ESTIMATOR.lock().unwrap().delay
}

#[cfg(test)]
pub(crate) fn reset_estimator(now: Instant) {
    let mut estimator = ESTIMATOR.lock().unwrap();
    estimator.requests = 0;
    estimator.total_latency = Duration::ZERO;
    estimator.delay = 0;
    estimator.last_snapshot = now;
}

#[cfg(test)]
pub(crate) fn set_delay(delay: usize) {
    ESTIMATOR.lock().unwrap().delay = delay;
}

// ── Interpolation system ────────────────────────────────────────────────

/// Build the per-tick interpolation system.
///
/// Run the returned closure once per client tick, on the same task that
/// applies snapshots (or with the world otherwise synchronized).
///
/// # Panics
///
/// Panics when an entity lists an interpolation id with no registration —
/// that is a configuration error, not a runtime condition.
pub fn new_interpolate_system() -> impl FnMut(&mut World) {
    |world: &mut World| interpolate_tick(world, Instant::now())
}

pub(crate) fn interpolate_tick(world: &mut World, now: Instant) {
    let delay = current_delay();
    let query = [
        std::any::TypeId::of::<NetworkId>(),
        std::any::TypeId::of::<InterpData>(),
        std::any::TypeId::of::<InterpHistory>(),
    ];

    for entity in world.query(&query) {
        let Some(keys) = world
            .get::<InterpData>(entity)
            .map(|data| data.component_keys().to_vec())
        else {
            continue;
        };

        for key in keys {
            let Some(type_id) = INTERP.lookup_type(key) else {
                panic!("interpolation id {key} is listed on {entity} but has no registration");
            };
            if !world.has_type(entity, type_id) {
                continue;
            }
            let value = world
                .get::<InterpHistory>(entity)
                .and_then(|history| history.buffers.get(&key))
                .and_then(|buffer| sample_buffer(buffer, key, now, delay));
            let Some(value) = value else {
                continue;
            };
            if let Err(err) = world.insert_boxed(entity, value) {
                warn!(%entity, %err, "failed to write interpolated value");
            }
        }
    }
}

/// Produce the interpolated value for one history buffer, or `None` when
/// there is nothing to do (fewer than two samples, or no lerp resolvable).
fn sample_buffer(
    buffer: &VecDeque<TimedSample>,
    key: InterpId,
    now: Instant,
    delay: usize,
) -> Option<Box<dyn Any + Send + Sync>> {
    if buffer.len() <= 1 {
        return None;
    }

    // prev: the newest sample at or before `now`; next: the sample one step
    // older than prev in the buffer.
    let mut prev = None;
    let mut next = None;
    for i in (0..buffer.len()).rev() {
        if buffer[i].ts <= now {
            prev = Some(i);
            if i > 0 {
                next = Some(i - 1);
                break;
            }
        }
    }

    // The effective newest sample, indexed back by the estimated delay.
    let delayed = &buffer[(buffer.len() - 1).saturating_sub(delay)];

    let Some(prev) = prev else {
        return INTERP.clone_value(key, buffer[0].value.as_ref());
    };
    let Some(next) = next else {
        return INTERP.clone_value(key, buffer[buffer.len() - 1].value.as_ref());
    };
    let prev = &buffer[prev];
    let next = &buffer[next];

    let span = delayed.ts.saturating_duration_since(next.ts);
    if span.is_zero() {
        // The delay index reached back to (or past) `next`; there is no
        // interval to parameterize.
        return INTERP.clone_value(key, delayed.value.as_ref());
    }

    let t = now.saturating_duration_since(prev.ts).as_secs_f64() / span.as_secs_f64();
    let lerp = INTERP.lookup_lerp(key)?;
    lerp(next.value.as_ref(), delayed.value.as_ref(), t)
}

#[cfg(test)]
mod tests {
    use std::any::TypeId;
    use std::collections::HashMap;

    use super::*;
    use crate::registry::find_by_network_id;
    use crate::snapshot::NetworkId;
    use crate::test_support::{TEST_POS_INTERP, TestPos, register_test_components, serial_guard};

    fn history_from(samples: Vec<(TestPos, Instant)>) -> InterpHistory {
        let mut buffers = HashMap::new();
        let buffer: VecDeque<TimedSample> = samples
            .into_iter()
            .map(|(value, ts)| TimedSample {
                value: Box::new(value) as Box<dyn Any + Send + Sync>,
                ts,
            })
            .collect();
        buffers.insert(TEST_POS_INTERP, buffer);
        InterpHistory { buffers }
    }

    fn interp_world(history: InterpHistory) -> (World, entsync_ecs::Entity) {
        let mut world = World::new();
        let entity = world.spawn();
        world.insert(entity, NetworkId(1)).unwrap();
        world
            .insert(entity, crate::snapshot::InterpData::new(vec![TEST_POS_INTERP]))
            .unwrap();
        world.insert(entity, TestPos::default()).unwrap();
        world.insert(entity, history).unwrap();
        (world, entity)
    }

    #[test]
    fn test_blends_next_toward_delayed() {
        let _guard = serial_guard();
        register_test_components();
        let t0 = Instant::now() - Duration::from_secs(1);
        reset_estimator(t0);

        // Three samples 100ms apart; now falls halfway after the second.
        let history = history_from(vec![
            (TestPos { x: 0.0, y: 0.0 }, t0),
            (TestPos { x: 10.0, y: 10.0 }, t0 + Duration::from_millis(100)),
            (TestPos { x: 20.0, y: 20.0 }, t0 + Duration::from_millis(200)),
        ]);
        let (mut world, entity) = interp_world(history);

        interpolate_tick(&mut world, t0 + Duration::from_millis(150));

        // prev = sample 2, next = sample 1, delayed = sample 3:
        // t = 50ms / 200ms, blended between next and delayed.
        let pos = world.get::<TestPos>(entity).unwrap();
        assert!((pos.x - 5.0).abs() < 1e-9, "got {}", pos.x);
        assert!((pos.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_leaves_component_untouched() {
        let _guard = serial_guard();
        register_test_components();
        let t0 = Instant::now() - Duration::from_secs(1);
        reset_estimator(t0);

        let history = history_from(vec![(TestPos { x: 9.0, y: 9.0 }, t0)]);
        let (mut world, entity) = interp_world(history);

        interpolate_tick(&mut world, t0 + Duration::from_millis(50));
        assert_eq!(world.get::<TestPos>(entity), Some(&TestPos::default()));
    }

    #[test]
    fn test_all_samples_in_future_writes_oldest() {
        let _guard = serial_guard();
        register_test_components();
        let t0 = Instant::now() + Duration::from_secs(10);
        reset_estimator(Instant::now());

        let history = history_from(vec![
            (TestPos { x: 1.0, y: 1.0 }, t0),
            (TestPos { x: 2.0, y: 2.0 }, t0 + Duration::from_millis(100)),
        ]);
        let (mut world, entity) = interp_world(history);

        interpolate_tick(&mut world, Instant::now());
        assert_eq!(world.get::<TestPos>(entity), Some(&TestPos { x: 1.0, y: 1.0 }));
    }

    #[test]
    fn test_delay_index_reaching_next_writes_delayed() {
        let _guard = serial_guard();
        register_test_components();
        let t0 = Instant::now() - Duration::from_secs(1);
        reset_estimator(t0);
        set_delay(1);

        // delayed = buffer[len-1-1] = the same sample as next.
        let history = history_from(vec![
            (TestPos { x: 3.0, y: 3.0 }, t0),
            (TestPos { x: 6.0, y: 6.0 }, t0 + Duration::from_millis(100)),
        ]);
        let (mut world, entity) = interp_world(history);

        interpolate_tick(&mut world, t0 + Duration::from_millis(150));
        assert_eq!(world.get::<TestPos>(entity), Some(&TestPos { x: 3.0, y: 3.0 }));
    }

    #[test]
    fn test_missing_history_key_is_skipped() {
        let _guard = serial_guard();
        register_test_components();
        reset_estimator(Instant::now());

        let (mut world, entity) = interp_world(InterpHistory::default());
        interpolate_tick(&mut world, Instant::now());
        assert_eq!(world.get::<TestPos>(entity), Some(&TestPos::default()));
        assert!(find_by_network_id(&world, NetworkId(1)).is_some());
    }

    #[test]
    fn test_entities_without_history_are_ignored() {
        let _guard = serial_guard();
        register_test_components();
        reset_estimator(Instant::now());

        let mut world = World::new();
        let entity = world.spawn();
        world.insert(entity, NetworkId(2)).unwrap();
        world.insert(entity, TestPos { x: 1.0, y: 1.0 }).unwrap();
        // No InterpData, no InterpHistory: not matched by the query.
        interpolate_tick(&mut world, Instant::now());
        assert_eq!(world.get::<TestPos>(entity), Some(&TestPos { x: 1.0, y: 1.0 }));
        assert!(world.has_type(entity, TypeId::of::<TestPos>()));
    }

    #[test]
    fn test_delay_estimate_is_cumulative_average() {
        let _guard = serial_guard();
        let t0 = Instant::now() - Duration::from_secs(60);
        reset_estimator(t0);

        record_snapshot(t0 + Duration::from_secs(2));
        assert_eq!(current_delay(), 2);

        // 2s then 1s between snapshots: average 1.5s, floored to 1.
        record_snapshot(t0 + Duration::from_secs(3));
        assert_eq!(current_delay(), 1);

        // Long quiet period dominates the running mean.
        record_snapshot(t0 + Duration::from_secs(33));
        assert_eq!(current_delay(), 11);
    }
}
