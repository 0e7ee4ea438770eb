//! Test Track Publisher - Main orchestrator for closed-test publishing
//!
//! Runs the complete publishing workflow for one build artifact:
//! - Artifact format check and test description lookup (no network)
//! - Authentication (client credentials or service account)
//! - Artifact digest, upload ticket and presigned upload
//! - Test version creation and package registration
//! - Compile status polling
//! - Test group resolution, version update and review submission
//! - Optional invite code generation
//!
//! Steps run strictly in order. Any failure aborts the run; entities already
//! created on the vendor side are left as they are, and their ids have
//! already been handed to the output sink.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::api::endpoints::{DistributionApi, InviteCode, OpenTestInfo};
use crate::api::gateway::ApiGateway;
use crate::core::config::PublishSettings;
use crate::core::error::PublishError;
use crate::core::poller::{CompilePollOptions, CompilePoller};
use crate::core::state_machine::{PublishStage, PublishStateMachine};
use crate::core::traits::{Clock, OutputSink, SystemClock, Transport};
use crate::orchestration::description::resolve_description;
use crate::orchestration::report::{
    OUTPUT_GROUP_ID, OUTPUT_INVITATION_CODE, OUTPUT_INVITATION_CODE_ID, OUTPUT_PKG_VERSION,
    OUTPUT_VERSION_ID, PublishReport,
};
use crate::orchestration::upload::{Artifact, check_artifact, upload_artifact};
use crate::security::authenticator::Authenticator;
use crate::security::secret_masker::SecretMasker;

/// Warning recorded when an invite code is requested without a test group
pub const INVITE_WITHOUT_GROUP_WARNING: &str =
    "invite code generation was requested but no test group is configured; skipped";

/// Warning recorded when the test version will carry an empty description
pub const EMPTY_DESCRIPTION_WARNING: &str =
    "no test description provided and the WhatToTest file is empty";

/// Main closed-test publishing orchestrator
pub struct TestTrackPublisher {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    masker: Arc<SecretMasker>,
    poll_options: CompilePollOptions,
    outputs: Option<Arc<dyn OutputSink>>,
    state_machine: PublishStateMachine,
}

impl TestTrackPublisher {
    /// Create a publisher using the system clock and default poll options
    pub fn new(transport: Arc<dyn Transport>, masker: Arc<SecretMasker>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            masker,
            poll_options: CompilePollOptions::default(),
            outputs: None,
            state_machine: PublishStateMachine::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_poll_options(mut self, options: CompilePollOptions) -> Self {
        self.poll_options = options;
        self
    }

    /// Send step outputs to `sink` as each step succeeds
    pub fn with_output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.outputs = Some(sink);
        self
    }

    pub fn state_machine(&self) -> &PublishStateMachine {
        &self.state_machine
    }

    /// Publish the configured artifact to the closed-test track
    ///
    /// # Returns
    ///
    /// Report with the created version, package and optional group/invite code
    pub async fn publish(&mut self, settings: &PublishSettings) -> Result<PublishReport, PublishError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("publish", run_id = %run_id, app_id = %settings.app_id);

        let result = self.run(settings, &run_id).instrument(span).await;

        if let Err(ref e) = result {
            let message = self.masker.mask(&e.to_string());
            if let Some(stage) = self.failed_at() {
                println!("  ❌ {} failed", stage.label());
            }
            self.state_machine.fail(&message);
        }

        result
    }

    fn failed_at(&self) -> Option<PublishStage> {
        let current = self.state_machine.current();
        (!current.is_terminal()).then_some(current)
    }

    fn enter(&mut self, stage: PublishStage) {
        self.state_machine.transition(stage);
        info!(stage = stage.label(), "entering stage");
    }

    /// A failed write is logged and never aborts the run
    async fn emit(&self, key: &str, value: &str) {
        let Some(sink) = &self.outputs else {
            return;
        };
        if let Err(e) = sink.set_output(key, value).await {
            warn!(key, error = %self.masker.mask(&e.to_string()), "failed to write step output");
        }
    }

    async fn run(&mut self, settings: &PublishSettings, run_id: &str) -> Result<PublishReport, PublishError> {
        let start_time = Instant::now();
        let mut warnings = Vec::new();

        // 0. Local checks, before any network access
        self.enter(PublishStage::Preparing);
        check_artifact(&settings.artifact_path).await?;
        let description = resolve_description(
            settings.test_desc.as_deref(),
            &settings.description_dir,
            &settings.language,
        )
        .await?;
        if description.is_empty() {
            warn!("{}", EMPTY_DESCRIPTION_WARNING);
            println!("⚠️  {}\n", EMPTY_DESCRIPTION_WARNING);
            warnings.push(EMPTY_DESCRIPTION_WARNING.to_string());
        }

        // 1. Authenticate
        self.enter(PublishStage::Authenticating);
        println!("🔐 Authenticating ({})...", settings.credential_source.describe());
        let credential = settings.credential_source.load().await?;
        let mut authenticator = Authenticator::new(
            Arc::clone(&self.transport),
            &settings.api_base_url,
            Arc::clone(&self.masker),
        );
        let session = authenticator.authenticate(&credential).await?;
        println!("  ✅ Authenticated\n");

        let api = DistributionApi::new(
            ApiGateway::new(Arc::clone(&self.transport), &settings.api_base_url, session),
            settings.app_id.clone(),
        );

        // 2. Digest
        self.enter(PublishStage::Digesting);
        println!("🔢 Computing digest of {}...", settings.artifact_path.display());
        let artifact = Artifact::load(&settings.artifact_path).await?;
        println!("  ✅ {} bytes, sha256 {}\n", artifact.size(), artifact.sha256);

        // 3. Upload ticket
        self.enter(PublishStage::RequestingUploadTicket);
        let ticket = api
            .upload_ticket(
                &artifact.file_name,
                artifact.size(),
                &artifact.sha256,
                settings.release_type,
            )
            .await?;

        // 4. Upload
        self.enter(PublishStage::Uploading);
        println!("📤 Uploading {}...", artifact.file_name);
        upload_artifact(self.transport.as_ref(), &ticket, &artifact).await?;
        println!("  ✅ Uploaded (object {})\n", ticket.object_id);

        // 5. Test version
        self.enter(PublishStage::CreatingTestVersion);
        let version_id = api
            .create_test_version(settings.release_type, settings.test_type, &description)
            .await?;
        println!("🧪 Test version created: {}", version_id);
        self.emit(OUTPUT_VERSION_ID, &version_id).await;

        // 6. Package
        self.enter(PublishStage::AddingPackage);
        let package_id = api.add_package(&ticket.object_id, &artifact.file_name).await?;
        println!("📦 Package added: {}\n", package_id);
        self.emit(OUTPUT_PKG_VERSION, &package_id).await;

        // 7. Compile
        self.enter(PublishStage::PollingCompile);
        println!("⏳ Waiting for package compilation...");
        let poller = CompilePoller::with_clock(self.poll_options.clone(), Arc::clone(&self.clock));
        let outcome = poller
            .poll(&package_id, || api.compile_status(&package_id))
            .await?;
        println!(
            "  ✅ Compiled after {} check(s), {}s\n",
            outcome.attempts,
            outcome.elapsed.as_secs()
        );

        // 8. Test group
        let group_id = match &settings.group_name {
            Some(group_name) => {
                self.enter(PublishStage::ResolvingTestGroup);
                let group_id = find_or_create_test_group(&api, group_name).await?;
                println!("👥 Test group: {} ({})", group_name, group_id);
                self.emit(OUTPUT_GROUP_ID, &group_id).await;
                Some(group_id)
            }
            None => None,
        };

        // 9. Update version
        self.enter(PublishStage::UpdatingTestVersion);
        let open_test_info = group_id.as_ref().map(|group_id| {
            let now = Utc::now();
            OpenTestInfo::for_group(
                group_id.clone(),
                now.timestamp_millis(),
                (now + ChronoDuration::days(i64::from(settings.open_test_days))).timestamp_millis(),
            )
        });
        api.update_test_version(&version_id, &package_id, open_test_info.as_ref())
            .await?;

        // 10. Submit
        self.enter(PublishStage::Submitting);
        api.submit_test_version(&version_id).await?;
        println!("📋 Submitted test version {} for review\n", version_id);

        // 11. Invite code
        let invite_code = match (&settings.invite_code, &group_id) {
            (Some(invite), Some(group_id)) => {
                self.enter(PublishStage::GeneratingInviteCode);
                let code: InviteCode = api
                    .create_invite_code(group_id, invite.validity_days, invite.invite_limit)
                    .await?;
                println!(
                    "🎟️  Invite code: {} (id {})\n",
                    code.invitation_code, code.invitation_code_id
                );
                self.emit(OUTPUT_INVITATION_CODE, &code.invitation_code).await;
                self.emit(OUTPUT_INVITATION_CODE_ID, &code.invitation_code_id).await;
                Some(code)
            }
            (Some(_), None) => {
                warn!("{}", INVITE_WITHOUT_GROUP_WARNING);
                println!("⚠️  {}\n", INVITE_WITHOUT_GROUP_WARNING);
                warnings.push(INVITE_WITHOUT_GROUP_WARNING.to_string());
                None
            }
            (None, _) => None,
        };

        self.enter(PublishStage::Success);

        Ok(PublishReport {
            run_id: run_id.to_string(),
            app_id: settings.app_id.clone(),
            version_id,
            package_id,
            group_id,
            invite_code,
            warnings,
            stages: self.state_machine.transitions().to_vec(),
            duration_ms: start_time.elapsed().as_millis() as u64,
            finished_at: Utc::now(),
        })
    }
}

/// Reuse the tester group named `name`, creating it when none exists
pub async fn find_or_create_test_group(
    api: &DistributionApi,
    name: &str,
) -> Result<String, PublishError> {
    let groups = api.list_test_groups().await?;

    if let Some(group) = groups.into_iter().find(|group| group.group_name == name) {
        info!(group_id = %group.group_id, "reusing existing test group");
        return Ok(group.group_id);
    }

    let group_id = api.create_test_group(name).await?;
    info!(group_id = %group_id, "created test group");
    Ok(group_id)
}
