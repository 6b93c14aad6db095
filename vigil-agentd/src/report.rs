//! Status report assembly.
//!
//! Builds the nested document served by the v2 API: agent identity,
//! build info, control-plane link status, cluster summary, capability
//! set and per-tier storage retention. Every collaborator is injected
//! at construction; the builder reads their snapshots and holds no
//! state of its own, so concurrent requests assemble independently.
//!
//! Absent information is absent from the document: optional fields are
//! `Option` and skipped on serialization, never emitted as null or 0.

use crate::buildinfo::BuildInfo;
use crate::capabilities::CapabilitySet;
use crate::config::AgentConfig;
use crate::identity::AgentIdentity;
use crate::link::{CloudStatus, LinkTracker};
use crate::retention::{self, humanize_seconds};
use crate::storage::{StorageStatus, StorageTierStats};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

pub const API_VERSION: u64 = 2;

/// Minimal view of one cluster member, as the report needs it.
#[derive(Debug, Clone, Copy)]
pub struct MemberView {
    pub is_self: bool,
    pub receiving: bool,
    pub sending: bool,
}

/// Membership snapshot provider. Implementations hand out a consistent
/// copy; the report never iterates a live, concurrently-mutated map.
pub trait ClusterMembers: Send + Sync {
    fn members(&self) -> Vec<MemberView>;
}

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub include_detail: bool,
    pub wrap_in_array: bool,
}

/// Request timing measurements, embedded verbatim when supplied.
#[derive(Debug, Clone, Serialize)]
pub struct QueryTimings {
    pub routing_ms: f64,
    pub prep_ms: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodesSummary {
    pub total: u64,
    pub receiving: u64,
    pub sending: u64,
    pub archived: u64,
}

#[derive(Debug, Clone, Serialize)]
struct ApiBlock {
    version: u64,
    bearer_protection: bool,
}

/// One `db_size` element. Field order is part of the wire surface.
#[derive(Debug, Clone, Serialize)]
pub struct TierRecord {
    tier: u64,
    point_every: String,
    metrics: u64,
    samples: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_max: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retention: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retention_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested_retention: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requested_retention_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_retention: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_retention_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currently_collected_metrics: Option<u64>,
}

/// The single-agent record. Identity fields always; everything else
/// only on detailed reports.
#[derive(Debug, Serialize)]
pub struct AgentRecord {
    mg: String,
    nd: Uuid,
    nm: String,
    now: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    ai: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application: Option<BuildInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cloud: Option<CloudStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodes: Option<NodesSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<CapabilitySet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api: Option<ApiBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_size: Option<Vec<TierRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<QueryTimings>,
}

/// Either the bare record, or `{"agents": [record]}` for callers that
/// expect the multi-agent shape.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReportDocument {
    Single(AgentRecord),
    Wrapped { agents: [AgentRecord; 1] },
}

impl ReportDocument {
    pub fn new(record: AgentRecord, wrap_in_array: bool) -> Self {
        if wrap_in_array {
            Self::Wrapped { agents: [record] }
        } else {
            Self::Single(record)
        }
    }
}

pub struct ReportBuilder {
    identity: AgentIdentity,
    build: BuildInfo,
    link: LinkTracker,
    cluster: Arc<dyn ClusterMembers>,
    capabilities: CapabilitySet,
    storage: Arc<dyn StorageStatus>,
    update_every_seconds: u64,
    groupings: Vec<u64>,
    bearer_protection: bool,
}

impl ReportBuilder {
    pub fn new(
        identity: AgentIdentity,
        build: BuildInfo,
        link: LinkTracker,
        cluster: Arc<dyn ClusterMembers>,
        capabilities: CapabilitySet,
        storage: Arc<dyn StorageStatus>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            identity,
            build,
            link,
            cluster,
            capabilities,
            storage,
            update_every_seconds: config.update_every_seconds,
            groupings: config.tiers.iter().map(|t| t.grouping).collect(),
            bearer_protection: config.bearer_token.is_some(),
        }
    }

    /// One-call report entry point.
    pub fn build(
        &self,
        now: i64,
        opts: ReportOptions,
        timings: Option<QueryTimings>,
    ) -> ReportDocument {
        let mut record = self.assemble(now, opts);
        record.timings = timings;
        ReportDocument::new(record, opts.wrap_in_array)
    }

    /// Assembles the record without timings, so callers can attach a
    /// measurement that covers the assembly itself.
    pub fn assemble(&self, now: i64, opts: ReportOptions) -> AgentRecord {
        let detail = opts.include_detail;
        AgentRecord {
            mg: self.identity.machine_guid.clone(),
            nd: self.identity.node_id,
            nm: self.identity.hostname.clone(),
            now,
            ai: opts.wrap_in_array.then_some(0),
            application: detail.then(|| self.build.clone()),
            cloud: detail.then(|| self.link.status()),
            nodes: detail.then(|| summarize(&self.cluster.members())),
            capabilities: detail.then(|| self.capabilities.clone()),
            api: detail.then(|| ApiBlock {
                version: API_VERSION,
                bearer_protection: self.bearer_protection,
            }),
            db_size: detail.then(|| self.db_size(now)),
            timings: None,
        }
    }

    /// Tiers in ascending index; the point spacing is the running
    /// product of the base interval and each tier's grouping factor.
    fn db_size(&self, now: i64) -> Vec<TierRecord> {
        let mut records = Vec::with_capacity(self.groupings.len());
        let mut point_every = self.update_every_seconds;
        for (tier, grouping) in self.groupings.iter().enumerate() {
            let Some(stats) = self.storage.tier_stats(tier) else {
                continue;
            };
            point_every *= grouping;
            records.push(tier_record(&stats, point_every, now));
        }
        records
    }
}

/// Single pass over the membership snapshot. Self counts toward the
/// total but is excluded from the receiving/archived split and from
/// sender counting.
fn summarize(members: &[MemberView]) -> NodesSummary {
    let mut summary = NodesSummary { total: 0, receiving: 0, sending: 0, archived: 0 };
    for member in members {
        summary.total += 1;
        if member.is_self {
            continue;
        }
        if member.receiving {
            summary.receiving += 1;
        } else {
            summary.archived += 1;
        }
        if member.sending {
            summary.sending += 1;
        }
    }
    summary
}

fn tier_record(stats: &StorageTierStats, point_every_seconds: u64, now: i64) -> TierRecord {
    let est = retention::estimate(stats, now);
    let has_disk = stats.disk_used_bytes > 0 || stats.disk_max_bytes > 0;
    let human = |seconds: i64| humanize_seconds(seconds.max(0) as u64);

    TierRecord {
        tier: stats.tier as u64,
        point_every: humanize_seconds(point_every_seconds),
        metrics: stats.metrics,
        samples: stats.samples,
        disk_used: has_disk.then_some(stats.disk_used_bytes),
        disk_max: has_disk.then_some(stats.disk_max_bytes),
        disk_percent: has_disk.then_some(est.used_percent),
        from: est.retention_so_far.map(|_| stats.first_sample_unix),
        to: est.retention_so_far.map(|_| now),
        retention: est.retention_so_far,
        retention_human: est.retention_so_far.map(human),
        requested_retention: est.requested,
        requested_retention_human: est.requested.map(human),
        expected_retention: est.expected,
        expected_retention_human: est.expected.map(human),
        currently_collected_metrics: (stats.currently_collected_metrics > 0)
            .then_some(stats.currently_collected_metrics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use vigil_devkit::json_assert::{
        assert_field_absent, assert_field_equals, assert_field_exists, get_nested_field,
    };

    struct FakeCluster(Vec<MemberView>);

    impl ClusterMembers for FakeCluster {
        fn members(&self) -> Vec<MemberView> {
            self.0.clone()
        }
    }

    struct FakeStorage(Vec<StorageTierStats>);

    impl StorageStatus for FakeStorage {
        fn tier_stats(&self, tier: usize) -> Option<StorageTierStats> {
            self.0.get(tier).cloned()
        }
    }

    fn member(is_self: bool, receiving: bool, sending: bool) -> MemberView {
        MemberView { is_self, receiving, sending }
    }

    fn tier_stats(tier: usize, used: u64, max: u64, first: i64, cap: i64) -> StorageTierStats {
        StorageTierStats {
            tier,
            metrics: 3,
            samples: 1_000,
            currently_collected_metrics: 3,
            disk_used_bytes: used,
            disk_max_bytes: max,
            first_sample_unix: first,
            max_retention_seconds: cap,
        }
    }

    fn builder_with(
        config: &AgentConfig,
        members: Vec<MemberView>,
        tiers: Vec<StorageTierStats>,
    ) -> ReportBuilder {
        let identity = AgentIdentity {
            machine_guid: "11111111-2222-3333-4444-555555555555".into(),
            node_id: Uuid::nil(),
            hostname: "testhost".into(),
        };
        ReportBuilder::new(
            identity,
            BuildInfo::current(),
            LinkTracker::new(),
            Arc::new(FakeCluster(members)),
            CapabilitySet::detect(config),
            Arc::new(FakeStorage(tiers)),
            config,
        )
    }

    fn to_json(doc: &ReportDocument) -> Value {
        serde_json::to_value(doc).unwrap()
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn minimal_report_is_identity_only() {
        let config = AgentConfig::default();
        let builder = builder_with(&config, vec![member(true, false, false)], vec![]);
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: false, wrap_in_array: false },
            None,
        ));

        assert_field_equals(&doc, "mg", &json!("11111111-2222-3333-4444-555555555555")).unwrap();
        assert_field_equals(&doc, "nm", &json!("testhost")).unwrap();
        assert_field_equals(&doc, "now", &json!(NOW)).unwrap();
        for section in ["application", "cloud", "nodes", "capabilities", "api", "db_size", "ai", "timings"] {
            assert_field_absent(&doc, section).unwrap();
        }
    }

    #[test]
    fn detailed_report_carries_every_section() {
        let config = AgentConfig::default();
        let builder = builder_with(
            &config,
            vec![member(true, false, false)],
            vec![tier_stats(0, 50, 100, NOW - 1_000, 0)],
        );
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: true, wrap_in_array: false },
            None,
        ));

        for section in ["application", "cloud", "nodes", "capabilities", "db_size"] {
            assert_field_exists(&doc, section).unwrap();
        }
        assert_field_equals(&doc, "api.version", &json!(2)).unwrap();
        assert_field_equals(&doc, "api.bearer_protection", &json!(false)).unwrap();
    }

    #[test]
    fn array_wrap_nests_record_with_index() {
        let config = AgentConfig::default();
        let builder = builder_with(&config, vec![member(true, false, false)], vec![]);
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: false, wrap_in_array: true },
            None,
        ));

        let agents = get_nested_field(&doc, "agents").unwrap().as_array().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0]["ai"], json!(0));
        assert_eq!(agents[0]["nm"], json!("testhost"));
    }

    #[test]
    fn nodes_summary_classifies_members() {
        let config = AgentConfig::default();
        let builder = builder_with(
            &config,
            vec![
                member(true, false, false),
                member(false, true, true),
                member(false, true, false),
                member(false, false, false),
                member(false, false, false),
            ],
            vec![],
        );
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: true, wrap_in_array: false },
            None,
        ));

        assert_field_equals(&doc, "nodes.total", &json!(5)).unwrap();
        assert_field_equals(&doc, "nodes.receiving", &json!(2)).unwrap();
        assert_field_equals(&doc, "nodes.sending", &json!(1)).unwrap();
        assert_field_equals(&doc, "nodes.archived", &json!(2)).unwrap();
    }

    #[test]
    fn summary_invariant_archived_plus_receiving() {
        let members = vec![
            member(true, false, false),
            member(false, true, false),
            member(false, false, true),
            member(false, true, true),
        ];
        let summary = summarize(&members);
        assert_eq!(summary.archived + summary.receiving, summary.total - 1);
        assert!(summary.sending <= summary.total);
    }

    #[test]
    fn point_spacing_is_running_product() {
        let mut config = AgentConfig::default();
        config.update_every_seconds = 2;
        config.tiers[0].grouping = 1;
        config.tiers[1].grouping = 2;
        config.tiers[2].grouping = 3;
        let builder = builder_with(
            &config,
            vec![member(true, false, false)],
            vec![
                tier_stats(0, 0, 0, 0, 0),
                tier_stats(1, 0, 0, 0, 0),
                tier_stats(2, 0, 0, 0, 0),
            ],
        );
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: true, wrap_in_array: false },
            None,
        ));

        let db_size = get_nested_field(&doc, "db_size").unwrap().as_array().unwrap();
        let spacings: Vec<&str> =
            db_size.iter().map(|t| t["point_every"].as_str().unwrap()).collect();
        assert_eq!(spacings, ["2 seconds", "4 seconds", "12 seconds"]);
    }

    #[test]
    fn default_tier_table_spacing_reads_naturally() {
        let config = AgentConfig::default();
        let builder = builder_with(
            &config,
            vec![member(true, false, false)],
            vec![
                tier_stats(0, 0, 0, 0, 0),
                tier_stats(1, 0, 0, 0, 0),
                tier_stats(2, 0, 0, 0, 0),
            ],
        );
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: true, wrap_in_array: false },
            None,
        ));

        let db_size = get_nested_field(&doc, "db_size").unwrap().as_array().unwrap();
        assert_eq!(db_size[0]["point_every"], json!("1 second"));
        assert_eq!(db_size[1]["point_every"], json!("1 minute"));
        assert_eq!(db_size[2]["point_every"], json!("1 hour"));
    }

    #[test]
    fn missing_tier_is_skipped_without_advancing_spacing() {
        let mut config = AgentConfig::default();
        config.tiers[1].grouping = 60;
        let builder = builder_with(
            &config,
            vec![member(true, false, false)],
            vec![tier_stats(0, 0, 0, 0, 0)],
        );
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: true, wrap_in_array: false },
            None,
        ));

        let db_size = get_nested_field(&doc, "db_size").unwrap().as_array().unwrap();
        assert_eq!(db_size.len(), 1);
        assert_eq!(db_size[0]["tier"], json!(0));
    }

    #[test]
    fn tier_with_data_reports_retention_block() {
        let config = AgentConfig::default();
        let builder = builder_with(
            &config,
            vec![member(true, false, false)],
            vec![tier_stats(0, 50, 100, NOW - 1_000, 1_500)],
        );
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: true, wrap_in_array: false },
            None,
        ));

        let tier = &get_nested_field(&doc, "db_size").unwrap()[0];
        assert_eq!(tier["disk_used"], json!(50));
        assert_eq!(tier["disk_max"], json!(100));
        assert_eq!(tier["disk_percent"], json!(50.0));
        assert_eq!(tier["from"], json!(NOW - 1_000));
        assert_eq!(tier["to"], json!(NOW));
        assert_eq!(tier["retention"], json!(1_000));
        assert_eq!(tier["retention_human"], json!("16 minutes, 40 seconds"));
        assert_eq!(tier["requested_retention"], json!(1_500));
        assert_eq!(tier["expected_retention"], json!(1_500));
        assert_eq!(tier["expected_retention_human"], json!("25 minutes"));
        assert_eq!(tier["currently_collected_metrics"], json!(3));
    }

    #[test]
    fn empty_tier_omits_conditional_fields() {
        let config = AgentConfig::default();
        let mut stats = tier_stats(0, 0, 0, 0, 0);
        stats.currently_collected_metrics = 0;
        let builder = builder_with(&config, vec![member(true, false, false)], vec![stats]);
        let doc = to_json(&builder.build(
            NOW,
            ReportOptions { include_detail: true, wrap_in_array: false },
            None,
        ));

        let tier = get_nested_field(&doc, "db_size").unwrap()[0].as_object().unwrap();
        assert_eq!(tier["metrics"], json!(3));
        assert_eq!(tier["samples"], json!(1000));
        for field in [
            "disk_used",
            "disk_max",
            "disk_percent",
            "from",
            "to",
            "retention",
            "retention_human",
            "requested_retention",
            "expected_retention",
            "currently_collected_metrics",
        ] {
            assert!(!tier.contains_key(field), "unexpected field {field}");
        }
    }

    #[test]
    fn timings_embedded_only_when_supplied() {
        let config = AgentConfig::default();
        let builder = builder_with(&config, vec![member(true, false, false)], vec![]);
        let opts = ReportOptions { include_detail: false, wrap_in_array: false };

        let without = to_json(&builder.build(NOW, opts, None));
        assert_field_absent(&without, "timings").unwrap();

        let with = to_json(&builder.build(
            NOW,
            opts,
            Some(QueryTimings { routing_ms: 0.2, prep_ms: 1.4 }),
        ));
        assert_field_exists(&with, "timings.prep_ms").unwrap();
    }
}
