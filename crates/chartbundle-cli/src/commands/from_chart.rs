//! From-chart command - create a release bundle from a chart

use std::path::PathBuf;

use chartbundle_core::{TranslateRequest, Translator};
use chartbundle_engine::Engine;
use chartbundle_repo::{
    ArtifactoryClient, DistributionClient, ReleaseBundleParams, ReleaseNotesSyntax, ServerConfig,
    ServerDetails, resolve_details,
};
use clap::Args;
use console::style;

use super::ConnectionArgs;
use crate::error::{CliError, Result};

#[derive(Args, Debug, Clone)]
pub struct FromChartArgs {
    /// Release bundle name
    pub bundle_name: String,

    /// Release bundle version
    pub bundle_version: String,

    /// Chart path in Artifactory: <repository>/<path to chart>.tgz
    #[arg(long = "chart-path")]
    pub chart_path: String,

    /// Docker repository holding the chart's images
    #[arg(long = "docker-repo")]
    pub docker_repo: String,

    /// Plan and search without creating the bundle
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Sign the bundle once created
    #[arg(long)]
    pub sign: bool,

    /// Bundle description
    #[arg(long)]
    pub desc: Option<String>,

    /// File holding the release notes
    #[arg(long = "release-notes-path")]
    pub release_notes_path: Option<PathBuf>,

    /// Release notes syntax: markdown, asciidoc or plain_text
    #[arg(long = "release-notes-syntax")]
    pub release_notes_syntax: Option<String>,

    /// GPG passphrase used for signing
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Repository storing the signed bundle
    #[arg(long)]
    pub repo: Option<String>,

    /// Configured server to use
    #[arg(long = "server-id")]
    pub server_id: Option<String>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl FromChartArgs {
    /// Bundle parameters, reading the release notes file if one was given
    pub fn bundle_params(&self) -> Result<ReleaseBundleParams> {
        let syntax = ReleaseNotesSyntax::resolve(
            self.release_notes_syntax.as_deref(),
            self.release_notes_path.as_deref(),
        )?;

        let release_notes = match &self.release_notes_path {
            Some(path) => Some(
                std::fs::read_to_string(path).map_err(|e| CliError::io_at(path.display(), e))?,
            ),
            None => None,
        };

        Ok(ReleaseBundleParams {
            name: self.bundle_name.clone(),
            version: self.bundle_version.clone(),
            sign_immediately: self.sign,
            storing_repository: self.repo.clone(),
            gpg_passphrase: self.passphrase.clone(),
            description: self.desc.clone(),
            release_notes,
            release_notes_syntax: syntax,
        })
    }

    pub fn request(&self) -> TranslateRequest {
        TranslateRequest {
            chart_path: self.chart_path.clone(),
            docker_repo: self.docker_repo.clone(),
            dry_run: self.dry_run,
        }
    }

    /// Connection details, falling back to the configured servers
    pub fn server_details(&self) -> Result<ServerDetails> {
        let config = ServerConfig::load()?;
        let details = resolve_details(
            self.connection.to_details(self.server_id.as_deref()),
            &config,
        )?;
        details.require_url()?;
        details.require_distribution_url()?;
        Ok(details)
    }
}

pub async fn run(args: &FromChartArgs) -> Result<()> {
    // Everything local is checked before the first request
    let details = args.server_details()?;
    let params = args.bundle_params()?;
    let request = args.request();
    tracing::debug!(server = %details.server_id, chart = %request.chart_path, "resolved server");

    let artifactory = ArtifactoryClient::new(&details)?;
    let distribution = DistributionClient::new(&details, params)?;
    let engine = Engine::new(false);

    eprintln!(
        "{} {} from {}",
        style(if args.dry_run { "Planning" } else { "Creating" }).cyan().bold(),
        style(format!("{}/{}", args.bundle_name, args.bundle_version)).bold(),
        request.chart_path
    );

    let translator = Translator {
        source: &artifactory,
        renderer: &engine,
        bundler: &distribution,
        search: &artifactory,
    };
    let report = translator.run(&request).await?;

    if args.dry_run {
        eprintln!("{} release bundle not created (dry run)", style("Note:").yellow());
    } else {
        eprintln!(
            "{} release bundle {}/{} created",
            style("✓").green(),
            args.bundle_name,
            args.bundle_version
        );
    }

    let missing = report.reconciliation.missing.len();
    if missing > 0 {
        eprintln!(
            "{} {} of {} expected artifacts not found",
            style("Warning:").yellow().bold(),
            missing,
            report.plan.artifacts.len()
        );
    }

    print!("{}", report.reconciliation);
    Ok(())
}
