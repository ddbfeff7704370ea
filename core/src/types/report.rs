use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::resource::ResourceId;

/// Lifecycle of a resource within one run.
///
/// `Pending -> Examining -> UpToDate | Applying -> Converged | Failed`.
/// `WouldApply` replaces `Applying` when the run is a dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Pending,
    Examining,
    UpToDate,
    Applying,
    Converged,
    WouldApply,
    Failed,
}

impl ResourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResourceState::UpToDate
                | ResourceState::Converged
                | ResourceState::WouldApply
                | ResourceState::Failed
        )
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceState::Pending => "pending",
            ResourceState::Examining => "examining",
            ResourceState::UpToDate => "up to date",
            ResourceState::Applying => "applying",
            ResourceState::Converged => "converged",
            ResourceState::WouldApply => "would apply",
            ResourceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What happened to one resource. A resource reached again through a
/// notification gets a second outcome entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub state: ResourceState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub resource: ResourceId,
    pub cause: String,
}

/// Result of a convergence run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub dry_run: bool,
    pub outcomes: Vec<ResourceOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl Report {
    pub fn new(dry_run: bool) -> Self {
        Report {
            dry_run,
            ..Report::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Resources that changed the host (or would have, in a dry run).
    pub fn applied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, ResourceState::Converged | ResourceState::WouldApply))
            .count()
    }

    pub fn up_to_date_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == ResourceState::UpToDate)
            .count()
    }

    pub fn outcome(&self, id: &ResourceId) -> Option<&ResourceOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    /// Process exit status: 0 converged, 1 a resource failed.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "would apply" } else { "applied" };
        let mut line = format!(
            "{} resources: {} {}, {} up to date",
            self.outcomes.len(),
            self.applied_count(),
            verb,
            self.up_to_date_count()
        );
        if let Some(failure) = &self.failure {
            line.push_str(&format!("; {} failed: {}", failure.resource, failure.cause));
        }
        line
    }
}
