//! Image publishing.
//!
//! Builds and pushes an Airflow image for every ledger record that does not
//! carry the current publish tag yet, then marks the record as published.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::PublisherConfig;
use crate::image::{BuildRequest, EngineError, ImageEngine, ImageRef};
use crate::ledger::{find_unpublished, Ledger, LedgerError};

/// Errors that stop a publishing run.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The container engine failed for a release.
    #[error("Failed to publish image for release '{release}': {source}")]
    Engine {
        release: String,
        #[source]
        source: EngineError,
    },

    /// The build context directory does not exist.
    #[error("Build context {} does not exist", .0.display())]
    MissingContext(PathBuf),
}

/// How images are built and tagged.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Build context directory.
    pub context: PathBuf,
    /// Publish tag, used as image tag and as the ledger completion marker.
    pub tag: String,
    /// Extra `--build-arg` pairs.
    pub build_args: Vec<(String, String)>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            context: PathBuf::from("./qa-scenario-dags"),
            tag: "deploy-1".to_string(),
            build_args: vec![("platform".to_string(), "linux/amd64".to_string())],
        }
    }
}

/// Outcome of a publishing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Registry references pushed during this run.
    pub published: Vec<String>,
    /// Records that already carried the tag.
    pub already_published: usize,
    /// Labels (or ids) of records skipped for lack of a release name.
    pub skipped: Vec<String>,
}

/// Publish an image for every record not yet published under `options.tag`.
///
/// The ledger is saved after each push, so a failure part-way through keeps
/// the records that were already published.
///
/// # Errors
/// Returns an error if the ledger cannot be read or written, the build
/// context is missing, or the engine fails for any record.
pub async fn run<E>(
    config: &PublisherConfig,
    engine: &E,
    ledger: &Ledger,
    options: &PublishOptions,
) -> Result<PublishReport, PublishError>
where
    E: ImageEngine + ?Sized,
{
    let mut records = ledger.load()?;
    let mut report = PublishReport::default();

    let pending = find_unpublished(&records, &options.tag).len();
    if pending > 0 && !options.context.is_dir() {
        return Err(PublishError::MissingContext(options.context.clone()));
    }
    info!(pending, tag = %options.tag, "Records awaiting publish");

    for index in 0..records.len() {
        let record = &records[index];
        if record.is_published(&options.tag) {
            info!(
                release = %record.release_name,
                tag = %options.tag,
                "Image already published, skipping"
            );
            report.already_published += 1;
            continue;
        }

        if record.release_name.is_empty() {
            let name = if record.label.is_empty() { &record.id } else { &record.label };
            warn!(record = %name, "Record has no release name, skipping");
            report.skipped.push(name.clone());
            continue;
        }

        let release = record.release_name.clone();
        let local = ImageRef::local(&release, &options.tag);
        let remote = ImageRef::for_release(&config.server, &release, &options.tag);
        info!(release = %release, image = %remote, "Publishing image");

        let engine_err = |source: EngineError| PublishError::Engine {
            release: release.clone(),
            source,
        };
        engine
            .build(&BuildRequest {
                context: options.context.clone(),
                image: local.clone(),
                build_args: options.build_args.clone(),
            })
            .await
            .map_err(engine_err)?;
        engine.tag(&local, &remote).await.map_err(engine_err)?;
        engine.push(&remote).await.map_err(engine_err)?;

        records[index].mark_published(&options.tag);
        ledger.save(&records)?;
        info!(release = %release, image = %remote, "Image pushed");
        report.published.push(remote.to_string());
    }

    Ok(report)
}
