//! The run flow: configuration, workflow construction, scheduling and reporting.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};

use imagetest_core::config::ImagetestConfig;
use imagetest_core::types::{RunSummary, TestSuiteResult};
use imagetest_graph::WorkflowDocument;
use imagetest_reducer::{DEFAULT_REPORT_NAME, write_report};
use imagetest_scheduler::artifacts::join_key;
use imagetest_scheduler::{
    CommandEngine, LocalArtifactStore, MirrorReport, RunContext, RunMode, RunOutcome,
    ScheduleOptions, Scheduler, SuiteFilter, build_workflows, mirror_artifacts,
};

use crate::cli::{Cli, DEFAULT_CONFIG_PATH};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};
use crate::suites::builtin_registry;

/// Load the configuration file, then apply flag overrides and validate.
///
/// A missing file is an error only when `--config` names it explicitly.
pub async fn load_config(cli: &Cli) -> Result<ImagetestConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => ImagetestConfig::load(path).await?,
        None => ImagetestConfig::load_or_default(DEFAULT_CONFIG_PATH).await?,
    };
    apply_flags(&mut config, cli);
    config.validate()?;
    Ok(config)
}

/// Apply command-line flags on top of file and environment values.
pub fn apply_flags(config: &mut ImagetestConfig, cli: &Cli) {
    fn set<T: Clone>(target: &mut T, value: Option<&T>) {
        if let Some(value) = value {
            *target = value.clone();
        }
    }
    fn path_string(path: &Path) -> String {
        path.display().to_string()
    }

    set(&mut config.general.log_level, cli.log_level.as_ref());
    set(&mut config.general.log_format, cli.log_format.as_ref());
    set(&mut config.scheduler.project, cli.project.as_ref());
    if !cli.zone.is_empty() {
        config.scheduler.zones = cli.zone.clone();
    }
    if !cli.test_projects.is_empty() {
        config.scheduler.test_projects = cli.test_projects.clone();
    }
    set(&mut config.scheduler.parallel_count, cli.parallel_count.as_ref());
    if let Some(stagger) = cli.parallel_stagger {
        config.scheduler.parallel_stagger_ms = u64::try_from(stagger.as_millis()).unwrap_or(u64::MAX);
    }
    if let Some(timeout) = cli.timeout {
        config.engine.step_timeout_secs = timeout.as_secs();
    }
    if let Some(path) = &cli.out_path {
        config.report.out_path = path_string(path);
    }
    set(&mut config.report.set_exit_status, cli.set_exit_status.as_ref());
    if let Some(path) = &cli.local_path {
        config.artifacts.local_path = path_string(path);
    }
}

fn run_mode(cli: &Cli) -> RunMode {
    if cli.print {
        RunMode::Print
    } else if cli.validate {
        RunMode::Validate
    } else {
        RunMode::Execute
    }
}

/// Build the run context from the effective configuration.
pub fn build_context(config: &ImagetestConfig, cli: &Cli) -> Result<RunContext, CliError> {
    let filter = SuiteFilter::new(cli.filter.as_deref(), cli.exclude.as_deref())?;
    let mut ctx = RunContext::new(
        config.scheduler.project.clone(),
        config.scheduler.zones.clone(),
        config.scheduler.test_projects.clone(),
    )?
    .with_filter(filter)
    .with_step_timeout(Duration::from_secs(config.engine.step_timeout_secs));
    if let Some(pattern) = &cli.exclude_discrete_tests {
        ctx = ctx.with_exclude_discrete_tests(pattern.clone());
    }
    Ok(ctx)
}

/// Execute the whole run and render its result.
pub async fn execute(
    cli: &Cli,
    config: ImagetestConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let mode = run_mode(cli);
    if mode == RunMode::Execute && config.engine.program.trim().is_empty() {
        return Err(CliError::Config(
            "engine.program must be set to execute workflows".to_owned(),
        ));
    }

    let ctx = build_context(&config, cli)?;
    let registry = builtin_registry()?;
    let workflows = build_workflows(&ctx, &registry, &cli.images)?;
    info!(
        run_id = %ctx.run_id(),
        workflows = workflows.len(),
        mode = ?mode,
        "workflows ready"
    );

    let store = Arc::new(LocalArtifactStore::new(&config.artifacts.root));
    let engine = Arc::new(CommandEngine::from_config(&config.engine, ctx.run_id()));
    let scheduler = Scheduler::new(
        engine,
        Arc::clone(&store),
        ctx.run_id(),
        ScheduleOptions {
            parallel_count: config.scheduler.parallel_count,
            stagger: Duration::from_millis(config.scheduler.parallel_stagger_ms),
            mode,
            artifacts_prefix: config.artifacts.prefix.clone(),
        },
    )?;

    let token = scheduler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, no new workflows will be launched");
            token.cancel();
        }
    });

    match scheduler.run(workflows).await? {
        RunOutcome::Printed(documents) => writer.render(&PrintReport { documents }),
        RunOutcome::Validated(workflows) => writer.render(&ValidateReport { workflows }),
        RunOutcome::Executed(summary) => {
            let report_path = PathBuf::from(&config.report.out_path);
            write_report(&report_path, DEFAULT_REPORT_NAME, &summary.suites)?;

            let mirror = if config.artifacts.local_path.is_empty() {
                None
            } else {
                let prefix = format!("{}/", join_key(&[&config.artifacts.prefix, ctx.run_id()]));
                match mirror_artifacts(
                    store.as_ref(),
                    &prefix,
                    Path::new(&config.artifacts.local_path),
                )
                .await
                {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!(error = %e, "artifact mirroring failed");
                        None
                    }
                }
            };

            let run_report = RunReport::new(ctx.run_id(), &summary, &report_path, mirror);
            writer.render(&run_report)?;
            exit_status(&summary, config.report.set_exit_status)
        }
    }
}

/// Decide the exit status of a finished run.
pub fn exit_status(summary: &RunSummary, enforce: bool) -> Result<(), CliError> {
    if enforce && summary.is_failing() {
        return Err(CliError::TestFailures {
            failures: summary.failures,
            errors: summary.errors,
        });
    }
    Ok(())
}

// ---- payloads ----

/// Rendered workflow documents (`--print`).
#[derive(Serialize)]
pub struct PrintReport {
    pub documents: Vec<WorkflowDocument>,
}

impl Render for PrintReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for document in &self.documents {
            let json = document
                .to_json_pretty()
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            writeln!(w, "{json}")?;
        }
        Ok(())
    }
}

/// Validation result (`--validate`).
#[derive(Serialize)]
pub struct ValidateReport {
    pub workflows: usize,
}

impl Render for ValidateReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "{} {} workflow(s) valid", "✓".green(), self.workflows)
    }
}

/// One row of the run summary table.
#[derive(Serialize)]
pub struct SuiteRow {
    pub name: String,
    pub tests: usize,
    pub failures: usize,
    pub errors: usize,
    pub skipped: usize,
    pub time: String,
    pub passed: bool,
}

impl From<&TestSuiteResult> for SuiteRow {
    fn from(suite: &TestSuiteResult) -> Self {
        Self {
            name: suite.name.clone(),
            tests: suite.tests,
            failures: suite.failures,
            errors: suite.errors,
            skipped: suite.skipped,
            time: suite.time(),
            passed: !suite.is_failing(),
        }
    }
}

/// Artifact mirroring counts.
#[derive(Serialize)]
pub struct MirrorRow {
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Summary of an executed run.
#[derive(Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub suites: Vec<SuiteRow>,
    pub tests: usize,
    pub failures: usize,
    pub errors: usize,
    pub report_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror: Option<MirrorRow>,
}

impl RunReport {
    pub fn new(
        run_id: &str,
        summary: &RunSummary,
        report_path: &Path,
        mirror: Option<MirrorReport>,
    ) -> Self {
        Self {
            run_id: run_id.to_owned(),
            suites: summary.suites.iter().map(SuiteRow::from).collect(),
            tests: summary.tests,
            failures: summary.failures,
            errors: summary.errors,
            report_path: report_path.display().to_string(),
            mirror: mirror.map(|m| MirrorRow {
                copied: m.copied,
                skipped: m.skipped,
                failed: m.failed,
            }),
        }
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Run {}", self.run_id)?;
        writeln!(
            w,
            "{:<40} {:>6} {:>6} {:>6} {:>6} {:>9}  STATUS",
            "SUITE", "TESTS", "FAIL", "ERR", "SKIP", "TIME"
        )?;
        writeln!(w, "{}", "-".repeat(84))?;
        for row in &self.suites {
            let status = if row.passed {
                "PASS".green()
            } else {
                "FAIL".red()
            };
            writeln!(
                w,
                "{:<40} {:>6} {:>6} {:>6} {:>6} {:>9}  {}",
                row.name, row.tests, row.failures, row.errors, row.skipped, row.time, status
            )?;
        }
        writeln!(w, "{}", "-".repeat(84))?;
        writeln!(
            w,
            "Total: {} tests, {} failures, {} errors",
            self.tests, self.failures, self.errors
        )?;
        writeln!(w, "JUnit report: {}", self.report_path)?;
        if let Some(mirror) = &self.mirror {
            writeln!(
                w,
                "Artifacts: {} copied, {} skipped, {} failed",
                mirror.copied, mirror.skipped, mirror.failed
            )?;
        }
        Ok(())
    }
}
