//! Background metric collection.
//!
//! Samples host cpu/memory/load once per base interval and feeds the
//! tiered store, so a running agent accumulates real retention.

use crate::storage::{MetricSample, TieredStore};
use std::sync::Arc;
use sysinfo::System;
use time::OffsetDateTime;
use tracing::{debug, warn};

fn sample_system(sys: &mut System) -> [(&'static str, f64); 3] {
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu = sys.global_cpu_info().cpu_usage() as f64;
    let total = sys.total_memory();
    let available = sys.available_memory();
    let ram = if total > 0 {
        (total.saturating_sub(available)) as f64 * 100.0 / total as f64
    } else {
        0.0
    };
    let load1 = System::load_average().one;

    [("system.cpu", cpu), ("system.ram", ram), ("system.load1", load1)]
}

pub fn spawn_collector(store: Arc<TieredStore>, update_every_seconds: u64) {
    tokio::spawn(async move {
        let mut sys = System::new();
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(update_every_seconds.max(1)));
        loop {
            interval.tick().await;
            let sampled = sample_system(&mut sys);
            let samples: Vec<MetricSample<'_>> = sampled
                .iter()
                .map(|&(metric, value)| MetricSample { metric, value })
                .collect();
            let now = OffsetDateTime::now_utc().unix_timestamp();
            match store.append(&samples, now) {
                Ok(()) => debug!("stored {} samples", samples.len()),
                Err(e) => warn!("failed to store samples: {e}"),
            }
        }
    });
}
