//! Discovery engine: periodic simulated proximity scans
//!
//! Each tick reports every other online node once, with a synthetic distance
//! and signal strength. Timestamps in one node's report stream strictly
//! increase even when two ticks land on the same wall-clock millisecond.

use crate::config::MeshConfig;
use crate::mesh::registry::NodeRegistry;
use crate::mesh::scheduler::Scheduler;
use crate::types::{now_millis, ProximityReport};
use rand::Rng;
use std::collections::HashMap;
use std::ops::{ControlFlow, Range};
use std::time::Duration;
use tracing::{debug, info};

/// Report generator for one observing node
pub struct ProximityScanner {
    own_id: String,
    distance_m: Range<f64>,
    signal: Range<f64>,
    last_timestamp: HashMap<String, u64>,
}

impl ProximityScanner {
    pub fn new(own_id: impl Into<String>, config: &MeshConfig) -> Self {
        Self {
            own_id: own_id.into(),
            distance_m: config.report_distance_m.clone(),
            signal: config.report_signal.clone(),
            last_timestamp: HashMap::new(),
        }
    }

    /// One discovery pass over the registry
    pub fn scan<R: Rng + ?Sized>(
        &mut self,
        registry: &NodeRegistry,
        rng: &mut R,
    ) -> Vec<ProximityReport> {
        let now = now_millis();
        let mut reports = Vec::new();

        for node in registry.all() {
            if node.id == self.own_id || !node.is_online {
                continue;
            }

            let last = self.last_timestamp.get(&node.id).copied().unwrap_or(0);
            let timestamp = now.max(last + 1);
            self.last_timestamp.insert(node.id.clone(), timestamp);
            registry.update(&node.id, |n| n.last_seen = timestamp);

            reports.push(ProximityReport {
                id: format!(
                    "proximity-{}-{}-{}",
                    node.id,
                    timestamp,
                    &uuid::Uuid::new_v4().simple().to_string()[..8]
                ),
                user_id: node.id,
                username: node.username,
                distance: rng.gen_range(self.distance_m.clone()),
                signal_strength: rng.gen_range(self.signal.clone()),
                timestamp,
                room_id: node.room_id,
            });
        }

        reports
    }
}

/// Start/stop wrapper that owns at most one scan timer per observing node
#[derive(Clone)]
pub struct DiscoveryEngine {
    own_id: String,
    registry: NodeRegistry,
    scheduler: Scheduler,
    config: MeshConfig,
}

impl DiscoveryEngine {
    pub fn new(
        own_id: impl Into<String>,
        registry: NodeRegistry,
        scheduler: Scheduler,
        config: MeshConfig,
    ) -> Self {
        Self {
            own_id: own_id.into(),
            registry,
            scheduler,
            config,
        }
    }

    fn timer_name(&self) -> String {
        format!("discovery:{}", self.own_id)
    }

    /// Begin scanning. Returns false, changing nothing, if already running.
    pub fn start<F>(&self, mut on_found: F) -> bool
    where
        F: FnMut(ProximityReport) + Send + 'static,
    {
        let mut scanner = ProximityScanner::new(self.own_id.clone(), &self.config);
        let registry = self.registry.clone();
        let period = self.config.discovery_period_ms.clone();

        let started = self.scheduler.every(
            self.timer_name(),
            move || Duration::from_millis(rand::thread_rng().gen_range(period.clone())),
            move || {
                let reports = scanner.scan(&registry, &mut rand::thread_rng());
                debug!("Discovery tick produced {} report(s)", reports.len());
                for report in reports {
                    on_found(report);
                }
                ControlFlow::Continue(())
            },
        );

        if started {
            info!("Starting discovery for {}", self.own_id);
        }
        started
    }

    /// Stop scanning; safe when not running
    pub fn stop(&self) {
        if self.scheduler.cancel(&self.timer_name()) {
            info!("Discovery stopped for {}", self.own_id);
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_scheduled(&self.timer_name())
    }
}
