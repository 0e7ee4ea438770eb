//! Orchestration layer for closed-test publishing
//!
//! This module provides the publishing pipeline and the collaborators it
//! drives: artifact upload, test description lookup and run reporting.

pub mod description;
pub mod report;
pub mod test_track_publisher;
pub mod upload;

// Re-export main types for convenience
pub use description::{read_description, resolve_description};
pub use report::{GithubOutputFile, PublishReport};
pub use test_track_publisher::{TestTrackPublisher, find_or_create_test_group};
pub use upload::{Artifact, check_artifact, upload_artifact};
