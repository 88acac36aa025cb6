use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{
    sync::{Semaphore, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    encoder::Encoder,
    error::TranscodeError,
    variant::{Encoding, Variant, VariantSpec, applicable_variants, normalize_ext},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Succeeded,
    Failed,
}

/// One variant to produce from the batch source. Its status is published
/// on a watch channel so the batch handle can observe progress.
#[derive(Debug)]
pub struct TranscodeJob {
    spec: &'static VariantSpec,
    source: PathBuf,
    destination: PathBuf,
    status: watch::Sender<JobStatus>,
}

impl TranscodeJob {
    fn new(
        spec: &'static VariantSpec,
        source: PathBuf,
        destination: PathBuf,
    ) -> (Self, watch::Receiver<JobStatus>) {
        let (status, progress) = watch::channel(JobStatus::Pending);
        let job = Self {
            spec,
            source,
            destination,
            status,
        };
        (job, progress)
    }

    pub fn variant(&self) -> Variant {
        self.spec.variant
    }

    async fn run(self, encoder: Arc<dyn Encoder>, permits: Arc<Semaphore>) -> JobReport {
        let variant = self.spec.variant;
        let result = match self.spec.encoding {
            Encoding::Passthrough => {
                self.status.send_replace(JobStatus::Running);
                log::debug!("job {} copying {}", variant, self.source.display());
                tokio::fs::copy(&self.source, &self.destination)
                    .await
                    .map(|_| ())
                    .map_err(|source| TranscodeError::Io { variant, source })
            }
            Encoding::Bitrate { kbps } => match permits.acquire().await {
                Ok(_permit) => {
                    self.status.send_replace(JobStatus::Running);
                    log::debug!("job {} encoding at {}k", variant, kbps);
                    encoder
                        .encode(&self.source, &self.destination, kbps)
                        .await
                        .map_err(|e| TranscodeError::Encode {
                            variant,
                            message: format!("{:#}", e),
                        })
                }
                Err(e) => Err(TranscodeError::Aborted {
                    variant,
                    message: e.to_string(),
                }),
            },
        };

        match result {
            Ok(()) => {
                self.status.send_replace(JobStatus::Succeeded);
                log::info!("job {} -> {} done", variant, self.destination.display());
                JobReport {
                    variant,
                    destination: self.destination,
                    status: JobStatus::Succeeded,
                    error: None,
                }
            }
            Err(e) => {
                self.status.send_replace(JobStatus::Failed);
                log::error!("job {} -> {} failed: {}", variant, self.destination.display(), e);
                JobReport {
                    variant,
                    destination: self.destination,
                    status: JobStatus::Failed,
                    error: Some(e),
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct JobReport {
    pub variant: Variant,
    pub destination: PathBuf,
    pub status: JobStatus,
    pub error: Option<TranscodeError>,
}

/// Outcome of a resolved batch. Produced once every job reached a terminal state.
#[derive(Debug)]
pub struct BatchReport {
    pub id: Uuid,
    pub stem: String,
    pub source_ext: String,
    pub status: BatchStatus,
    pub jobs: Vec<JobReport>,
    /// False when the temp source could not be removed; logged, not fatal.
    pub source_removed: bool,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Succeeded
    }

    pub fn errors(&self) -> impl Iterator<Item = &TranscodeError> {
        self.jobs.iter().filter_map(|j| j.error.as_ref())
    }

    pub fn failure_summary(&self) -> String {
        self.errors()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Variant files of this batch, in ladder order.
    pub fn files(&self) -> Vec<&Path> {
        self.jobs.iter().map(|j| j.destination.as_path()).collect()
    }

    /// Removes every variant file of the batch. Used when the caller cannot
    /// commit a successful batch.
    pub async fn discard(&self) -> usize {
        remove_files(self.jobs.iter().map(|j| j.destination.as_path())).await
    }
}

/// Awaitable handle of a submitted batch. The batch keeps running if the
/// handle is dropped.
pub struct BatchHandle {
    id: Uuid,
    source: PathBuf,
    destinations: Vec<PathBuf>,
    progress: Vec<(Variant, watch::Receiver<JobStatus>)>,
    handle: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current status of every job, in ladder order.
    pub fn job_statuses(&self) -> Vec<(Variant, JobStatus)> {
        self.progress
            .iter()
            .map(|(variant, rx)| (*variant, *rx.borrow()))
            .collect()
    }

    /// Waits for the barrier.
    pub async fn wait(self) -> BatchReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                log::error!("batch {} task failed: {}", self.id, e);
                let source_removed = remove_source(&self.source).await;
                remove_files(self.destinations.iter().map(PathBuf::as_path)).await;
                BatchReport {
                    id: self.id,
                    stem: String::new(),
                    source_ext: String::new(),
                    status: BatchStatus::Failed,
                    jobs: Vec::new(),
                    source_removed,
                }
            }
        }
    }
}

/// Fans an uploaded source out to one job per applicable variant.
pub struct Transcoder {
    encoder: Arc<dyn Encoder>,
    output_dir: PathBuf,
    permits: Arc<Semaphore>,
}

impl Transcoder {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        output_dir: impl Into<PathBuf>,
        max_concurrent_encodes: usize,
    ) -> Self {
        Self {
            encoder,
            output_dir: output_dir.into(),
            permits: Arc::new(Semaphore::new(max_concurrent_encodes.max(1))),
        }
    }

    pub fn variant_path(&self, stem: &str, variant: Variant, source_ext: &str) -> PathBuf {
        self.output_dir
            .join(crate::variant::variant_file_name(stem, variant, source_ext))
    }

    /// Starts every job of the batch. `source` is owned by the batch from here
    /// on and is removed exactly once, after the barrier.
    pub fn submit_batch(&self, source: PathBuf, stem: &str, source_ext: &str) -> BatchHandle {
        let id = Uuid::new_v4();
        let source_ext = normalize_ext(source_ext);
        let mut jobs = Vec::new();
        let mut progress = Vec::new();
        for spec in applicable_variants(&source_ext) {
            let destination = self.output_dir.join(spec.file_name(stem, &source_ext));
            let (job, rx) = TranscodeJob::new(spec, source.clone(), destination);
            progress.push((spec.variant, rx));
            jobs.push(job);
        }
        let destinations = jobs.iter().map(|j| j.destination.clone()).collect();

        log::info!(
            "batch {} submitted: stem {}, {} jobs, source {}",
            id,
            stem,
            jobs.len(),
            source.display()
        );

        let batch = Batch {
            id,
            stem: stem.to_string(),
            source_ext,
            source: source.clone(),
            output_dir: self.output_dir.clone(),
            jobs,
        };
        let encoder = Arc::clone(&self.encoder);
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move { batch.run(encoder, permits).await });

        BatchHandle {
            id,
            source,
            destinations,
            progress,
            handle,
        }
    }

    /// Removes every ladder file that could exist for an asset.
    pub async fn purge(&self, stem: &str, source_ext: &str) -> usize {
        let paths: Vec<PathBuf> = applicable_variants(source_ext)
            .into_iter()
            .map(|spec| self.output_dir.join(spec.file_name(stem, source_ext)))
            .collect();
        remove_files(paths.iter().map(PathBuf::as_path)).await
    }
}

struct Batch {
    id: Uuid,
    stem: String,
    source_ext: String,
    source: PathBuf,
    output_dir: PathBuf,
    jobs: Vec<TranscodeJob>,
}

impl Batch {
    async fn run(self, encoder: Arc<dyn Encoder>, permits: Arc<Semaphore>) -> BatchReport {
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            log::warn!(
                "batch {}: create {} failed: {}",
                self.id,
                self.output_dir.display(),
                e
            );
        }

        let mut planned = Vec::with_capacity(self.jobs.len());
        let mut handles = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            planned.push((job.variant(), job.destination.clone()));
            let encoder = Arc::clone(&encoder);
            let permits = Arc::clone(&permits);
            handles.push(tokio::spawn(job.run(encoder, permits)));
        }

        // barrier: every job is terminal past this point
        let results = futures::future::join_all(handles).await;
        let jobs: Vec<JobReport> = results
            .into_iter()
            .zip(planned)
            .map(|(result, (variant, destination))| match result {
                Ok(report) => report,
                Err(e) => JobReport {
                    variant,
                    destination,
                    status: JobStatus::Failed,
                    error: Some(TranscodeError::Aborted {
                        variant,
                        message: e.to_string(),
                    }),
                },
            })
            .collect();

        let source_removed = remove_source(&self.source).await;

        let status = if jobs.iter().all(|j| j.status == JobStatus::Succeeded) {
            BatchStatus::Succeeded
        } else {
            BatchStatus::Failed
        };

        if status == BatchStatus::Failed {
            let removed = remove_files(jobs.iter().map(|j| j.destination.as_path())).await;
            log::warn!(
                "batch {} failed, rolled back {} variant files: {}",
                self.id,
                removed,
                jobs.iter()
                    .filter_map(|j| j.error.as_ref())
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        } else {
            log::info!("batch {} succeeded: stem {}", self.id, self.stem);
        }

        BatchReport {
            id: self.id,
            stem: self.stem,
            source_ext: self.source_ext,
            status,
            jobs,
            source_removed,
        }
    }
}

async fn remove_source(source: &Path) -> bool {
    match tokio::fs::remove_file(source).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            log::warn!("remove source {} failed: {}", source.display(), e);
            false
        }
    }
}

/// Returns how many files were actually deleted. Missing files are skipped.
async fn remove_files<'a>(paths: impl Iterator<Item = &'a Path>) -> usize {
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                log::debug!("removed {}", path.display());
                removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("remove {} failed: {}", path.display(), e),
        }
    }
    removed
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
