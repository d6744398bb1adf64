//! Command-level flows shared by the binary and the end-to-end tests:
//! acquire the destination, run the pipeline, then the optional
//! verification pass.

use crate::{
    config::{AccessOptions, DestinationConfig},
    destination::DestinationNetwork,
    errors::TransferResult,
    models::session::TransferSession,
    services::{
        access_service::{AccessScope, AccessScopeManager},
        transfer_service::{self, SampleUpload, StoreOptions, StoreReport},
        verifier::{Verifier, VerifyReport},
    },
    source::SourceStore,
};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::info;

/// Settings of one `store` run beyond the two config files.
#[derive(Clone, Debug)]
pub struct StoreRun {
    pub access: AccessOptions,
    pub window: u64,
    /// Root of the local copies written by the verification pass.
    pub debug_dir: PathBuf,
}

#[derive(Debug)]
pub struct StoreOutcome {
    pub report: StoreReport,
    /// Present only in debug mode.
    pub verify: Option<VerifyReport>,
    /// The scope to display: restricted when requested, else the working one.
    pub scope: AccessScope,
    pub bucket_created: bool,
}

#[derive(Debug)]
pub struct TestOutcome {
    pub sample: SampleUpload,
    pub scope: AccessScope,
    pub bucket_created: bool,
}

pub async fn run_store<S, N>(
    source: &S,
    network: &N,
    config: &DestinationConfig,
    run: &StoreRun,
    session: TransferSession,
) -> TransferResult<StoreOutcome>
where
    S: SourceStore + ?Sized,
    N: DestinationNetwork,
{
    let acquired = AccessScopeManager::new(network, config, run.access)
        .acquire()
        .await?;

    let opts = StoreOptions {
        upload_path: config.upload_path.clone(),
        window: run.window,
        debug: run.access.debug,
    };
    let report = transfer_service::store(source, &acquired.bucket, session, &opts).await?;

    let verify = if run.access.debug {
        let verifier = Verifier::new(&acquired.bucket, &config.upload_path, &run.debug_dir);
        Some(verifier.verify(&report.session.records).await)
    } else {
        None
    };

    Ok(StoreOutcome {
        report,
        verify,
        scope: acquired.exported_scope().clone(),
        bucket_created: acquired.bucket_created,
    })
}

pub async fn run_test<N: DestinationNetwork>(
    network: &N,
    config: &DestinationConfig,
    access: AccessOptions,
    local_dir: &Path,
) -> TransferResult<TestOutcome> {
    let acquired = AccessScopeManager::new(network, config, access)
        .acquire()
        .await?;
    let sample = transfer_service::upload_sample(
        &acquired.bucket,
        &config.upload_path,
        access.debug,
        Local::now().date_naive(),
        local_dir,
    )
    .await?;
    info!("Upload of {} complete", sample.name);
    Ok(TestOutcome {
        sample,
        scope: acquired.exported_scope().clone(),
        bucket_created: acquired.bucket_created,
    })
}

/// Line announcing the scope at the end of a `key` run.
pub fn scope_banner(scope: &AccessScope) -> String {
    if scope.is_restricted() {
        format!("Restricted Serialized Scope Key: {}", scope.serialized())
    } else {
        format!("Serialized Scope Key: {}", scope.serialized())
    }
}
