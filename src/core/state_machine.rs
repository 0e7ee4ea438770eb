//! State machine for tracking the publishing pipeline
//!
//! Transitions are kept in memory only; a run that fails is never resumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishStage {
    Initial,
    Preparing,
    Authenticating,
    Digesting,
    RequestingUploadTicket,
    Uploading,
    CreatingTestVersion,
    AddingPackage,
    PollingCompile,
    ResolvingTestGroup,
    UpdatingTestVersion,
    Submitting,
    GeneratingInviteCode,
    Success,
    Failed,
}

impl PublishStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Human-readable stage label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Preparing => "prepare",
            Self::Authenticating => "authenticate",
            Self::Digesting => "compute digest",
            Self::RequestingUploadTicket => "request upload ticket",
            Self::Uploading => "upload artifact",
            Self::CreatingTestVersion => "create test version",
            Self::AddingPackage => "add package",
            Self::PollingCompile => "poll compile status",
            Self::ResolvingTestGroup => "resolve test group",
            Self::UpdatingTestVersion => "update test version",
            Self::Submitting => "submit for review",
            Self::GeneratingInviteCode => "generate invite code",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Stage transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTransition {
    pub from: PublishStage,
    pub to: PublishStage,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tracks the current stage and the transition history of one run
#[derive(Debug, Clone)]
pub struct PublishStateMachine {
    current: PublishStage,
    transitions: Vec<StageTransition>,
    failed_stage: Option<PublishStage>,
}

impl Default for PublishStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishStateMachine {
    pub fn new() -> Self {
        Self {
            current: PublishStage::Initial,
            transitions: Vec::new(),
            failed_stage: None,
        }
    }

    /// Transition to a new stage
    pub fn transition(&mut self, to: PublishStage) {
        self.push(to, None);
    }

    /// Mark the run as failed, remembering the stage that failed
    pub fn fail(&mut self, error: &str) {
        if self.current.is_terminal() {
            return;
        }
        self.failed_stage = Some(self.current);
        self.push(PublishStage::Failed, Some(error.to_string()));
    }

    pub fn current(&self) -> PublishStage {
        self.current
    }

    /// Stage that was active when the run failed
    pub fn failed_stage(&self) -> Option<PublishStage> {
        self.failed_stage
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    fn push(&mut self, to: PublishStage, error: Option<String>) {
        self.transitions.push(StageTransition {
            from: self.current,
            to,
            timestamp: Utc::now(),
            error,
        });
        self.current = to;
    }
}
