//! Broadcast scenarios for deterministic simulation.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// CV-001: Subscriber joins after eviction, gets the tail then live frames
    LateJoiner,
    
    /// CV-002: One of three subscribers is severed mid-stream
    SeveredSubscriber,
    
    /// CV-003: 100 frames with nobody watching
    IdleHub,
    
    /// CV-004: Camera lost mid-match, history outlives the source
    SourceOutage,
    
    /// CV-005: Full synthetic match, court positions checked against ground truth
    FullMatch,
    
    /// CV-006: Connection fails partway through the backlog replay
    ReplayFailure,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::LateJoiner,
            ScenarioId::SeveredSubscriber,
            ScenarioId::IdleHub,
            ScenarioId::SourceOutage,
            ScenarioId::FullMatch,
            ScenarioId::ReplayFailure,
        ]
    }
    
    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::LateJoiner => "late_joiner",
            ScenarioId::SeveredSubscriber => "severed_subscriber",
            ScenarioId::IdleHub => "idle_hub",
            ScenarioId::SourceOutage => "source_outage",
            ScenarioId::FullMatch => "full_match",
            ScenarioId::ReplayFailure => "replay_failure",
        }
    }
    
    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::LateJoiner => "Buffer of 3, join after 5 frames, expect [3,4,5] then 6,7 live",
            ScenarioId::SeveredSubscriber => "Sever 1 of 3 subscribers, the other two keep receiving",
            ScenarioId::IdleHub => "Publish 100 frames to zero subscribers, nothing is serialized",
            ScenarioId::SourceOutage => "Fatal detector error, subscribers stay, late joiner gets history",
            ScenarioId::FullMatch => "12 players for 10s, court positions within 0.5m of ground truth",
            ScenarioId::ReplayFailure => "Join a 5-frame backlog, fail after 2 sends, pruned with no retry",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;
    
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "late_joiner" | "latejoiner" | "cv-001" => Ok(ScenarioId::LateJoiner),
            "severed_subscriber" | "severed" | "cv-002" => Ok(ScenarioId::SeveredSubscriber),
            "idle_hub" | "idle" | "cv-003" => Ok(ScenarioId::IdleHub),
            "source_outage" | "outage" | "cv-004" => Ok(ScenarioId::SourceOutage),
            "full_match" | "match" | "cv-005" => Ok(ScenarioId::FullMatch),
            "replay_failure" | "replay" | "cv-006" => Ok(ScenarioId::ReplayFailure),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
