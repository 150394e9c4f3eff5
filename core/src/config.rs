//! Mesh simulation settings
//!
//! Every timing and randomisation knob of the simulator lives here so tests
//! and the CLI can tune them without touching the protocol code.

use crate::types::DEFAULT_MAX_MEMBERS;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Empty or inverted range for {0}")]
    InvalidRange(&'static str),

    #[error("Invalid max members: must be > 0")]
    InvalidMaxMembers,

    #[error("Invalid join preference: must be 0.0-1.0, got {0}")]
    InvalidJoinPreference(f64),

    #[error("Invalid period for {0}: must be > 0")]
    InvalidPeriod(&'static str),
}

/// Local history retention applied by `LocalStore::prune_expired`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_age_hours: u64,
    pub max_messages_per_room: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age_hours: 24,
            max_messages_per_room: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Discovery tick period, sampled once per tick
    pub discovery_period_ms: Range<u64>,
    /// Simulated distance of a proximity report, in meters
    pub report_distance_m: Range<f64>,
    /// Simulated signal strength of a proximity report
    pub report_signal: Range<f64>,
    /// Artificial per-peer transport latency
    pub broadcast_latency_ms: Range<u64>,
    pub max_members: usize,
    /// Activity simulator tick period
    pub activity_period_ms: u64,
    /// Probability that an idle demo node joins an existing room
    pub join_preference: f64,
    pub icebreaker_initial_delay_ms: u64,
    pub icebreaker_spacing_ms: u64,
    pub greeting_delay_ms: u64,
    pub retention: RetentionPolicy,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            discovery_period_ms: 3000..5000,
            report_distance_m: 5.0..55.0,
            report_signal: 60.0..100.0,
            broadcast_latency_ms: 100..300,
            max_members: DEFAULT_MAX_MEMBERS,
            activity_period_ms: 5000,
            join_preference: 0.7,
            icebreaker_initial_delay_ms: 2000,
            icebreaker_spacing_ms: 2000,
            greeting_delay_ms: 1000,
            retention: RetentionPolicy::default(),
        }
    }
}

impl MeshConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discovery_period_ms.is_empty() || self.discovery_period_ms.start == 0 {
            return Err(ConfigError::InvalidRange("discovery_period_ms"));
        }
        if !(self.report_distance_m.start < self.report_distance_m.end) {
            return Err(ConfigError::InvalidRange("report_distance_m"));
        }
        if !(self.report_signal.start < self.report_signal.end)
            || self.report_signal.start < 0.0
            || self.report_signal.end > 100.0
        {
            return Err(ConfigError::InvalidRange("report_signal"));
        }
        if self.broadcast_latency_ms.is_empty() {
            return Err(ConfigError::InvalidRange("broadcast_latency_ms"));
        }
        if self.max_members == 0 {
            return Err(ConfigError::InvalidMaxMembers);
        }
        if !(0.0..=1.0).contains(&self.join_preference) {
            return Err(ConfigError::InvalidJoinPreference(self.join_preference));
        }
        if self.activity_period_ms == 0 {
            return Err(ConfigError::InvalidPeriod("activity_period_ms"));
        }
        Ok(())
    }

    pub fn activity_period(&self) -> Duration {
        Duration::from_millis(self.activity_period_ms)
    }
}
