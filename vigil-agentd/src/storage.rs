//! Tiered time-series store.
//!
//! One append-only file per tier under the data dir. Tier 0 stores one
//! point per collected sample; tier N stores one point every product of
//! the grouping factors of tiers 0..=N. The report layer consumes none
//! of this directly - it only sees [`StorageTierStats`] snapshots
//! through the [`StorageStatus`] trait.

use crate::config::{AgentConfig, TierConf};
use crate::state::{new_state, Shared};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Bytes per stored point: little-endian unix timestamp + f64 value.
const POINT_SIZE: u64 = 16;

/// Everything the status report needs to know about one tier.
///
/// `disk_max_bytes == 0` means the tier has no quota and the
/// free-space probe failed. `first_sample_unix == 0` means no data yet.
#[derive(Debug, Clone, Default)]
pub struct StorageTierStats {
    pub tier: usize,
    pub metrics: u64,
    pub samples: u64,
    pub currently_collected_metrics: u64,
    pub disk_used_bytes: u64,
    pub disk_max_bytes: u64,
    pub first_sample_unix: i64,
    pub max_retention_seconds: i64,
}

/// Narrow status interface the report assembler consumes.
pub trait StorageStatus: Send + Sync {
    /// `None` when the tier is not configured; the report skips it.
    fn tier_stats(&self, tier: usize) -> Option<StorageTierStats>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct MetricSample<'a> {
    pub metric: &'a str,
    pub value: f64,
}

#[derive(Debug, Default)]
struct TierRuntime {
    samples: u64,
    /// Base samples accumulated since the last stored point.
    carry: u64,
    first_sample_unix: i64,
    file_len: u64,
}

#[derive(Debug, Default)]
struct StoreRuntime {
    metrics: BTreeSet<String>,
    collected: u64,
    tiers: Vec<TierRuntime>,
}

pub struct TieredStore {
    data_dir: PathBuf,
    tiers: Vec<TierConf>,
    /// Base samples per stored point, per tier: running product of the
    /// grouping factors of tiers 0..=n.
    spans: Vec<u64>,
    runtime: Shared<StoreRuntime>,
}

impl TieredStore {
    /// Opens (or creates) the tier files. Sample counters and the
    /// first-sample timestamp are rebuilt from existing files, so a
    /// restarted agent keeps reporting its accumulated retention.
    pub fn open(config: &AgentConfig) -> Result<Self, StorageError> {
        let data_dir = PathBuf::from(&config.data_dir);
        std::fs::create_dir_all(&data_dir)?;

        let mut spans = Vec::with_capacity(config.tiers.len());
        let mut span = 1u64;
        for tier in &config.tiers {
            span *= tier.grouping;
            spans.push(span);
        }

        let mut tiers_rt = Vec::with_capacity(config.tiers.len());
        for idx in 0..config.tiers.len() {
            let path = tier_file(&data_dir, idx);
            let mut rt = TierRuntime::default();
            if path.exists() {
                let len = std::fs::metadata(&path)?.len();
                rt.file_len = len;
                rt.samples = len / POINT_SIZE;
                if len >= POINT_SIZE {
                    let mut ts = [0u8; 8];
                    std::fs::File::open(&path)?.read_exact(&mut ts)?;
                    rt.first_sample_unix = i64::from_le_bytes(ts);
                }
            }
            tiers_rt.push(rt);
        }

        Ok(Self {
            data_dir,
            tiers: config.tiers.clone(),
            spans,
            runtime: new_state(StoreRuntime {
                metrics: BTreeSet::new(),
                collected: 0,
                tiers: tiers_rt,
            }),
        })
    }

    /// Records one collection round. Every tier whose span has elapsed
    /// gets one point per metric appended to its file.
    pub fn append(&self, samples: &[MetricSample<'_>], now_unix: i64) -> Result<(), StorageError> {
        let mut rt = self.runtime.lock();
        rt.collected = samples.len() as u64;
        for sample in samples {
            if !rt.metrics.contains(sample.metric) {
                rt.metrics.insert(sample.metric.to_string());
            }
        }

        for (idx, span) in self.spans.iter().enumerate() {
            let fires = {
                let tier = &mut rt.tiers[idx];
                tier.carry += 1;
                tier.carry >= *span
            };
            if !fires {
                continue;
            }

            let mut buf = Vec::with_capacity(samples.len() * POINT_SIZE as usize);
            for sample in samples {
                buf.extend_from_slice(&now_unix.to_le_bytes());
                buf.extend_from_slice(&sample.value.to_le_bytes());
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(tier_file(&self.data_dir, idx))?;
            file.write_all(&buf)?;

            let tier = &mut rt.tiers[idx];
            tier.carry = 0;
            tier.samples += samples.len() as u64;
            tier.file_len += buf.len() as u64;
            if tier.first_sample_unix == 0 {
                tier.first_sample_unix = now_unix;
            }
        }
        Ok(())
    }
}

impl StorageStatus for TieredStore {
    fn tier_stats(&self, tier: usize) -> Option<StorageTierStats> {
        let conf = self.tiers.get(tier)?;
        let (metrics, collected, samples, first_sample_unix, used) = {
            let rt = self.runtime.lock();
            let t = &rt.tiers[tier];
            (rt.metrics.len() as u64, rt.collected, t.samples, t.first_sample_unix, t.file_len)
        };

        let max = if conf.disk_quota_bytes > 0 {
            conf.disk_quota_bytes
        } else {
            // No quota: extrapolate against what the filesystem can
            // still take, the way `df` would see it.
            match free_space_for(&self.data_dir) {
                Some(free) => free + used,
                None => 0,
            }
        };

        Some(StorageTierStats {
            tier,
            metrics,
            samples,
            currently_collected_metrics: collected,
            disk_used_bytes: used,
            disk_max_bytes: max,
            first_sample_unix,
            max_retention_seconds: conf.max_retention_seconds,
        })
    }
}

fn tier_file(data_dir: &Path, tier: usize) -> PathBuf {
    data_dir.join(format!("tier{tier}.vgl"))
}

/// Free bytes on the filesystem holding `path`: the disk with the
/// longest mount-point prefix wins.
fn free_space_for(path: &Path) -> Option<u64> {
    let resolved = path.canonicalize().ok()?;
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| resolved.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
}
