//! Closed Test Publisher CLI
//!
//! Publishes one app build to a vendor closed-testing track

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use closed_test_publisher::core::config::{
    ApiConfig, AppConfig, ArtifactConfig, CredentialsConfig, InviteCodeConfig, TestingConfig,
};
use closed_test_publisher::core::config_loader::CONFIG_FILENAME;
use closed_test_publisher::orchestration::upload::{Artifact, check_artifact};
use closed_test_publisher::orchestration::{GithubOutputFile, resolve_description};
use closed_test_publisher::security::{Credential, SignedAssertion};
use closed_test_publisher::{
    CONFIG_TEMPLATE, ConfigLoadOptions, ConfigLoader, PublishError, PublishSettings,
    PublisherConfig, ReqwestTransport, SecretMasker, TestTrackPublisher,
};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Publish an app build to a closed-testing track
#[derive(Parser)]
#[command(name = "closed-test-publisher")]
#[command(version)]
#[command(about = "Publish an app build to a closed-testing track", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the artifact and submit a closed-test version for review
    Publish {
        #[command(flatten)]
        config: ConfigArgs,

        /// Write the JSON run report to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Check configuration, credentials and artifact without network access
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Create a starter configuration file
    Init {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Configuration overrides shared by `publish` and `check`
#[derive(Args)]
struct ConfigArgs {
    /// Project path (defaults to current directory)
    #[arg(value_name = "PROJECT_PATH")]
    project_path: Option<PathBuf>,

    /// Configuration file (defaults to ./.closed-test-publisher.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Vendor API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Target app id
    #[arg(long)]
    app_id: Option<String>,

    /// Build artifact to upload
    #[arg(long, value_name = "FILE")]
    artifact: Option<PathBuf>,

    /// API client id (use with --client-secret)
    #[arg(long)]
    client_id: Option<String>,

    /// API client secret; prefer CTP_CLIENT_SECRET in CI
    #[arg(long)]
    client_secret: Option<String>,

    /// Service account key file
    #[arg(long, value_name = "FILE")]
    service_account_file: Option<PathBuf>,

    /// Release-type code (default 6)
    #[arg(long)]
    release_type: Option<u32>,

    /// Test-type code (default 3)
    #[arg(long)]
    test_type: Option<u32>,

    /// Literal test description; replaces the WhatToTest file
    #[arg(long)]
    test_desc: Option<String>,

    /// Tester group to find or create
    #[arg(long)]
    group_name: Option<String>,

    /// Description language (selects WhatToTest.<language>.txt, default zh-Hans)
    #[arg(long)]
    language: Option<String>,

    /// Directory containing the WhatToTest files (default APPTest)
    #[arg(long, value_name = "DIR")]
    description_dir: Option<PathBuf>,

    /// Generate an invite code for the test group (default true)
    #[arg(long, value_name = "BOOL")]
    generate_invite_code: Option<bool>,

    /// Invite code validity in days (default 7)
    #[arg(long, value_name = "DAYS")]
    invite_code_valid_days: Option<u32>,

    /// Testers one invite code admits (default 1000)
    #[arg(long, value_name = "COUNT")]
    invite_code_invite_limit: Option<u32>,
}

impl ConfigArgs {
    fn project_path(&self) -> PathBuf {
        self.project_path.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// CLI layer of the configuration; only flags that were given are set
    fn to_config(&self) -> PublisherConfig {
        PublisherConfig {
            api: self.api_url.clone().map(|base_url| ApiConfig {
                base_url: Some(base_url),
                timeout_secs: None,
            }),
            app: self.app_id.clone().map(|app_id| AppConfig {
                app_id: Some(app_id),
            }),
            artifact: (self.artifact.is_some() || self.release_type.is_some()).then(|| {
                ArtifactConfig {
                    path: self.artifact.clone(),
                    release_type: self.release_type,
                }
            }),
            credentials: some_if_set(CredentialsConfig {
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                service_account_file: self.service_account_file.clone(),
                service_account_json: None,
            }),
            testing: some_if_set(TestingConfig {
                test_type: self.test_type,
                description_dir: self.description_dir.clone(),
                language: self.language.clone(),
                test_desc: self.test_desc.clone(),
                group_name: self.group_name.clone(),
                open_test_days: None,
            }),
            invite_code: some_if_set(InviteCodeConfig {
                enabled: self.generate_invite_code,
                validity_days: self.invite_code_valid_days,
                invite_limit: self.invite_code_invite_limit,
            }),
            ..Default::default()
        }
    }

    async fn load_settings(&self) -> Result<PublishSettings, PublishError> {
        let options = ConfigLoadOptions {
            project_path: self.project_path(),
            config_file: self.config.clone(),
            cli_args: Some(self.to_config()),
            env: std::env::vars().collect::<HashMap<_, _>>(),
        };

        ConfigLoader::load(options).await?.resolve()
    }
}

/// `None` when no field of the section was given on the command line
fn some_if_set<T: Default + PartialEq>(section: T) -> Option<T> {
    (section != T::default()).then_some(section)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let masker = Arc::new(if std::env::var("GITHUB_ACTIONS").as_deref() == Ok("true") {
        SecretMasker::with_workflow_commands()
    } else {
        SecretMasker::new()
    });

    match run(cli.command, Arc::clone(&masker)).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{}", masker.mask(&format!("{:#}", e)));
            if let Some(publish_error) = e.downcast_ref::<PublishError>() {
                eprintln!("\n💡 Suggested actions ({}):", publish_error.code());
                for action in publish_error.suggested_actions() {
                    eprintln!("  - {}", action);
                }
            }
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "closed_test_publisher=debug"
    } else {
        "closed_test_publisher=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Commands, masker: Arc<SecretMasker>) -> Result<i32> {
    match command {
        Commands::Publish { config, report } => publish_command(config, report, masker).await,
        Commands::Check { config } => check_command(config, masker).await,
        Commands::Init {
            project_path,
            force,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            init_command(path, force).await
        }
    }
}

async fn publish_command(
    args: ConfigArgs,
    report_path: Option<PathBuf>,
    masker: Arc<SecretMasker>,
) -> Result<i32> {
    println!("\n📦 closed-test-publisher\n");

    let settings = args.load_settings().await?;
    let transport = ReqwestTransport::new(settings.request_timeout)?;
    let mut publisher = TestTrackPublisher::new(Arc::new(transport), Arc::clone(&masker));
    if let Some(sink) = GithubOutputFile::from_env() {
        publisher = publisher.with_output_sink(Arc::new(sink));
    }

    let report = publisher.publish(&settings).await?;

    if let Some(path) = report_path {
        report
            .write_json(&path)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("📝 Report written to {}", path.display());
    }

    if let Ok(summary_path) = std::env::var("GITHUB_STEP_SUMMARY")
        && !summary_path.is_empty()
    {
        report.append_step_summary(&PathBuf::from(summary_path)).await?;
    }

    println!("\n✅ Publishing completed successfully!");
    println!("  Test version: {}", report.version_id);
    println!("  Package: {}", report.package_id);
    if let Some(ref group_id) = report.group_id {
        println!("  Test group: {}", group_id);
    }
    if let Some(ref invite) = report.invite_code {
        println!("  Invite code: {}", invite.invitation_code);
    }
    for warning in &report.warnings {
        println!("  ⚠️  {}", warning);
    }

    Ok(0)
}

async fn check_command(args: ConfigArgs, masker: Arc<SecretMasker>) -> Result<i32> {
    println!("\n🔍 Publish Check\n");

    let settings = args.load_settings().await?;
    println!("  ✅ Configuration valid (app {})", settings.app_id);

    let credential = settings.credential_source.load().await?;
    match &credential {
        Credential::ClientCredential {
            client_id,
            client_secret,
        } => {
            masker.register(client_secret.expose_secret());
            println!("  ✅ Client credentials present (client id {})", client_id);
        }
        Credential::ServiceAccount(key) => {
            let assertion = SignedAssertion::build(key, chrono::Utc::now())?;
            masker.register(assertion.token().expose_secret());
            println!(
                "  ✅ Service account key signs assertions (key id {})",
                assertion.header.kid
            );
        }
    }

    check_artifact(&settings.artifact_path).await?;
    let artifact = Artifact::load(&settings.artifact_path).await?;
    println!(
        "  ✅ Artifact {} ({} bytes, sha256 {})",
        artifact.file_name,
        artifact.size(),
        artifact.sha256
    );

    let description = resolve_description(
        settings.test_desc.as_deref(),
        &settings.description_dir,
        &settings.language,
    )
    .await?;
    if description.is_empty() {
        println!(
            "  ⚠️  No test description given and WhatToTest.{}.txt is missing or empty",
            settings.language
        );
    } else {
        println!("  ✅ Test description ({} characters)", description.chars().count());
    }

    if settings.invite_code.is_some() && settings.group_name.is_none() {
        println!("  ⚠️  Invite code requested without testing.groupName; it will be skipped");
    }

    println!();
    Ok(0)
}

async fn init_command(project_path: PathBuf, force: bool) -> Result<i32> {
    println!("\n🎯 Initialize closed-test-publisher\n");

    let path = project_path.join(CONFIG_FILENAME);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) && !force {
        eprintln!(
            "⚠️  {} already exists (use --force to overwrite)",
            path.display()
        );
        return Ok(1);
    }

    tokio::fs::write(&path, CONFIG_TEMPLATE)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("  ✅ Created {}", path.display());
    Ok(0)
}
