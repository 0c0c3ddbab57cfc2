//! Pass runners behind the `rotate` and `retire` subcommands.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use keyward_lifecycle::memory::{InMemoryAuditLedger, InMemoryDirectory, InMemorySecretStore};
use keyward_lifecycle::prelude::*;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::PassArgs;
use crate::notifier::LogNotifier;
use crate::state;

/// Exit code when some identities failed to rotate.
const EXIT_PARTIAL_FAILURE: u8 = 2;

struct Session {
    directory: Arc<InMemoryDirectory>,
    secrets: Arc<InMemorySecretStore>,
    audit: Arc<InMemoryAuditLedger>,
    lifecycle: KeyLifecycle,
}

impl Session {
    fn open(config: &LifecycleConfig, pass: &PassArgs, cancel: CancellationToken) -> Result<Self> {
        let directory = Arc::new(state::load(&pass.state)?);
        let secrets = Arc::new(InMemorySecretStore::new());
        let audit = Arc::new(InMemoryAuditLedger::new());
        let collaborators = Collaborators {
            directory: directory.clone(),
            secrets: secrets.clone(),
            audit: audit.clone(),
            notifier: Arc::new(LogNotifier),
        };
        let lifecycle = KeyLifecycle::new(collaborators, config).with_cancellation(cancel);
        Ok(Self {
            directory,
            secrets,
            audit,
            lifecycle,
        })
    }

    async fn persist(&self, pass: &PassArgs) -> Result<()> {
        if pass.write_back {
            state::save(&pass.state, &self.directory.snapshot().await)?;
            info!(path = %pass.state.display(), "snapshot written back");
        }
        Ok(())
    }
}

fn trigger(pass: &PassArgs, kind: &str) -> TriggerContext {
    let event = json!({
        "source": "keyward.cli",
        "detail-type": "Manual Invocation",
        "pass": kind,
    });
    match pass.at {
        Some(at) => TriggerContext::new(event).at(at),
        None => TriggerContext::new(event),
    }
}

fn print_report(report: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(report).context("failed to render report")?;
    println!("{rendered}");
    Ok(())
}

/// Run one rotation pass.
///
/// With `--write-back` the issued secrets and the audit records are written
/// before the state file, so a persisted key always has its secret on disk.
pub async fn rotate(
    config: &LifecycleConfig,
    pass: &PassArgs,
    secrets_out: Option<&Path>,
    cancel: CancellationToken,
) -> Result<ExitCode> {
    let session = Session::open(config, pass, cancel)?;
    let report = session
        .lifecycle
        .run_rotation_pass(&trigger(pass, "rotation"))
        .await
        .inspect_err(log_fatal)
        .context("rotation pass aborted")?;

    print_report(&report)?;

    let secrets_target = match secrets_out {
        Some(path) => Some(path.to_path_buf()),
        None if pass.write_back => Some(state::secrets_path(&pass.state)),
        None => None,
    };
    if let Some(path) = secrets_target {
        let written = state::export_secrets(&session.secrets, &path).await?;
        info!(path = %path.display(), secrets = written, "secrets exported");
    }
    if pass.write_back {
        let path = state::audit_path(&pass.state);
        let records = session.audit.records().await;
        state::append_audit(&records, &path)?;
        info!(path = %path.display(), records = records.len(), "audit records appended");
    }
    session.persist(pass).await?;

    for outcome in &report.outcomes {
        if let Some(err) = outcome.error() {
            warn!(
                identity = %outcome.identity(),
                kind = err.kind(),
                error = %err,
                "identity not rotated"
            );
        }
    }

    Ok(match report.status {
        PassStatus::CompletedWithFailures => ExitCode::from(EXIT_PARTIAL_FAILURE),
        PassStatus::Completed | PassStatus::Cancelled => ExitCode::SUCCESS,
    })
}

/// Run one retirement pass.
pub async fn retire(
    config: &LifecycleConfig,
    pass: &PassArgs,
    cancel: CancellationToken,
) -> Result<ExitCode> {
    let session = Session::open(config, pass, cancel)?;
    let report = session
        .lifecycle
        .run_retirement_pass(&trigger(pass, "retirement"))
        .await
        .inspect_err(log_fatal)
        .context("retirement pass aborted")?;

    print_report(&report)?;
    session.persist(pass).await?;
    Ok(ExitCode::SUCCESS)
}

fn log_fatal(err: &LifecycleError) {
    match err.identity() {
        Some(identity) => error!(identity = %identity, kind = err.kind(), "pass stopped"),
        None => error!(kind = err.kind(), "pass stopped before any identity"),
    }
}
