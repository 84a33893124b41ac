use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    FactsCollection,
    Checks,
    Reports,
    Download,
    InterimPreparation,
    InitRamStart,
    LateTests,
    Preparation,
    RPMUpgrade,
    Applications,
    ThirdPartyApplications,
    Finalization,
    FirstBoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    FailPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasePolicy {
    pub errors: ErrorPolicy,
    pub retry: RetryScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Phase {
    pub const ALL: [Phase; 13] = [
        Phase::FactsCollection,
        Phase::Checks,
        Phase::Reports,
        Phase::Download,
        Phase::InterimPreparation,
        Phase::InitRamStart,
        Phase::LateTests,
        Phase::Preparation,
        Phase::RPMUpgrade,
        Phase::Applications,
        Phase::ThirdPartyApplications,
        Phase::Finalization,
        Phase::FirstBoot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::FactsCollection => "FactsCollection",
            Phase::Checks => "Checks",
            Phase::Reports => "Reports",
            Phase::Download => "Download",
            Phase::InterimPreparation => "InterimPreparation",
            Phase::InitRamStart => "InitRamStart",
            Phase::LateTests => "LateTests",
            Phase::Preparation => "Preparation",
            Phase::RPMUpgrade => "RPMUpgrade",
            Phase::Applications => "Applications",
            Phase::ThirdPartyApplications => "ThirdPartyApplications",
            Phase::Finalization => "Finalization",
            Phase::FirstBoot => "FirstBoot",
        }
    }

    pub fn tag(self) -> String {
        format!("{}PhaseTag", self.name())
    }

    pub fn index(self) -> usize {
        Phase::ALL
            .iter()
            .position(|phase| *phase == self)
            .unwrap_or(Phase::ALL.len())
    }

    pub fn is_checkpoint(self) -> bool {
        matches!(self, Phase::RPMUpgrade)
    }

    pub fn restart_after(self) -> bool {
        matches!(self, Phase::InterimPreparation | Phase::Finalization)
    }

    pub fn policy(self) -> PhasePolicy {
        PhasePolicy {
            errors: ErrorPolicy::FailPhase,
            retry: RetryScope::Phase,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|phase| phase.name().eq_ignore_ascii_case(value))
            .ok_or_else(|| anyhow::anyhow!("unknown phase '{value}'"))
    }
}
