//! VSA pipeline orchestration
//!
//! A `Service` drives each unit of work (a component, or the whole
//! snapshot) through generate → write → attest → upload, tracking it with
//! a `VsaProgress` and reporting every transition to an `EventSink`.
//!
//! `process_all_vsas` attempts every component, skipping the ones whose
//! digest lookup or processing fails, then processes the snapshot exactly
//! once. Only a snapshot failure fails the batch.

mod events;
mod state;
mod summary;

pub use events::{EventSink, RecordingSink, TracingSink, VsaEvent};
pub use state::{StateError, VsaProgress, VsaState, VsaUnit};
pub use summary::{
    BatchSummary, ComponentOutcome, OutcomeStatus, SnapshotOutcome, BATCH_SUMMARY_SCHEMA_ID,
    BATCH_SUMMARY_SCHEMA_VERSION,
};

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info};
use vsa_report::{Component, Report};

use crate::attest::{attest_vsa, Attestor, Signer};
use crate::config::VsaConfig;
use crate::context::Context;
use crate::digest::{predicate_digest, Digest};
use crate::error::{ProcessError, Stage, VsaError};
use crate::fs::{Filesystem, OsFs};
use crate::predicate::{ComponentGenerator, Predicate, PredicateGenerator, SnapshotGenerator};
use crate::upload::{NoopUploader, Uploader};
use crate::writer::{Writer, DEFAULT_FILE_MODE, DEFAULT_TEMP_DIR_PREFIX};

/// A unit that made it through every stage
#[derive(Debug, Clone)]
pub struct AttestedVsa {
    pub unit: VsaUnit,
    pub predicate: Predicate,
    pub predicate_path: PathBuf,
    pub envelope_path: PathBuf,

    /// Subject digest the envelope was bound to
    pub digest: Digest,

    /// Where the uploader deposited the envelope; empty if not uploaded
    pub location: String,
}

/// How the subject digest is obtained
enum SubjectDigest<'a> {
    /// Supplied by the caller
    Given(&'a str),
    /// Digest of the written predicate file
    OfPredicate,
}

/// Generates, writes, attests and uploads VSAs
pub struct Service {
    signer: Arc<dyn Signer>,
    fs: Arc<dyn Filesystem>,
    uploader: Arc<dyn Uploader>,
    events: Arc<dyn EventSink>,
    temp_dir_prefix: String,
    file_mode: u32,
    parallelism: usize,
}

/// Builder for `Service`
pub struct ServiceBuilder {
    signer: Arc<dyn Signer>,
    fs: Option<Arc<dyn Filesystem>>,
    uploader: Option<Arc<dyn Uploader>>,
    events: Option<Arc<dyn EventSink>>,
    temp_dir_prefix: String,
    file_mode: u32,
    parallelism: usize,
}

impl ServiceBuilder {
    pub fn fs(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn temp_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_dir_prefix = prefix.into();
        self
    }

    pub fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Number of components processed concurrently (minimum 1)
    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n.max(1);
        self
    }

    /// Apply prefix, mode, parallelism and upload strategy from config
    pub fn config(self, config: &VsaConfig) -> Self {
        let uploader: Arc<dyn Uploader> = Arc::from(config.upload.uploader());
        self.temp_dir_prefix(config.temp_dir_prefix.clone())
            .file_mode(config.file_mode)
            .parallelism(config.parallelism)
            .uploader(uploader)
    }

    pub fn build(self) -> Service {
        Service {
            signer: self.signer,
            fs: self.fs.unwrap_or_else(|| Arc::new(OsFs::new())),
            uploader: self.uploader.unwrap_or_else(|| Arc::new(NoopUploader)),
            events: self.events.unwrap_or_else(|| Arc::new(TracingSink)),
            temp_dir_prefix: self.temp_dir_prefix,
            file_mode: self.file_mode,
            parallelism: self.parallelism,
        }
    }
}

impl Service {
    /// Service writing through `fs`, with upload disabled
    pub fn new(signer: Arc<dyn Signer>, fs: Arc<dyn Filesystem>) -> Self {
        Self::builder(signer).fs(fs).build()
    }

    pub fn builder(signer: Arc<dyn Signer>) -> ServiceBuilder {
        ServiceBuilder {
            signer,
            fs: None,
            uploader: None,
            events: None,
            temp_dir_prefix: DEFAULT_TEMP_DIR_PREFIX.to_string(),
            file_mode: DEFAULT_FILE_MODE,
            parallelism: 1,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    fn writer(&self) -> Writer {
        Writer::with_fs(self.fs.clone())
            .temp_dir_prefix(self.temp_dir_prefix.clone())
            .file_mode(self.file_mode)
    }

    /// Generate, write, attest and upload the VSA for one component.
    ///
    /// `git_url` annotates the subject (may be empty); `digest` is the
    /// image digest as `<alg>:<hex>`.
    pub fn process_component_vsa(
        &self,
        ctx: &Context,
        report: &Report,
        component: &Component,
        git_url: &str,
        digest: &str,
    ) -> Result<AttestedVsa, ProcessError> {
        let unit = VsaUnit::Component(component.name.clone());
        let generator = ComponentGenerator::new(report, component);
        self.run_unit(
            ctx,
            unit,
            &generator,
            git_url,
            SubjectDigest::Given(digest),
            &component.container_image,
        )
    }

    /// Generate, write, attest and upload the snapshot VSA. The subject
    /// digest is the sha256 of the written predicate.
    pub fn process_snapshot_vsa(
        &self,
        ctx: &Context,
        report: &Report,
    ) -> Result<AttestedVsa, ProcessError> {
        let generator = SnapshotGenerator::new(report);
        let name = generator.snapshot_name().to_string();
        self.run_unit(
            ctx,
            VsaUnit::Snapshot(name.clone()),
            &generator,
            "",
            SubjectDigest::OfPredicate,
            &name,
        )
    }

    /// Process every component, then the snapshot.
    ///
    /// Lookup and processing failures skip the component and are recorded
    /// in the summary. The snapshot is processed exactly once regardless;
    /// its failure is returned as the batch error.
    pub fn process_all_vsas<G, D, E>(
        &self,
        ctx: &Context,
        report: &Report,
        get_git_url: G,
        get_digest: D,
    ) -> Result<BatchSummary, ProcessError>
    where
        G: Fn(&Component) -> String + Sync,
        D: Fn(&Component) -> Result<String, E> + Sync,
        E: Display,
    {
        let run_id = ulid::Ulid::new().to_string().to_lowercase();
        info!(
            run_id = %run_id,
            components = report.components.len(),
            parallelism = self.parallelism,
            "processing VSAs"
        );

        let outcomes = self.attempt_components(ctx, report, &get_git_url, &get_digest);
        let snapshot = self.process_snapshot_vsa(ctx, report);
        let summary = BatchSummary::reduce(run_id, outcomes, snapshot)?;

        info!("{}", summary.summary());
        Ok(summary)
    }

    fn attempt_components<G, D, E>(
        &self,
        ctx: &Context,
        report: &Report,
        get_git_url: &G,
        get_digest: &D,
    ) -> Vec<ComponentOutcome>
    where
        G: Fn(&Component) -> String + Sync,
        D: Fn(&Component) -> Result<String, E> + Sync,
        E: Display,
    {
        let components = &report.components;
        let workers = self.parallelism.min(components.len());
        if workers <= 1 {
            return components
                .iter()
                .map(|c| self.attempt_component(ctx, report, c, get_git_url, get_digest))
                .collect();
        }

        // Contiguous chunks keep the results in report order
        let chunk_size = components.len().div_ceil(workers);
        thread::scope(|scope| {
            let handles: Vec<_> = components
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|c| self.attempt_component(ctx, report, c, get_git_url, get_digest))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    fn attempt_component<G, D, E>(
        &self,
        ctx: &Context,
        report: &Report,
        component: &Component,
        get_git_url: &G,
        get_digest: &D,
    ) -> ComponentOutcome
    where
        G: Fn(&Component) -> String,
        D: Fn(&Component) -> Result<String, E>,
        E: Display,
    {
        let name = &component.name;
        let image = &component.container_image;

        let git_url = get_git_url(component);
        let digest = match get_digest(component) {
            Ok(digest) => digest,
            Err(e) => {
                let err = ProcessError::new(
                    VsaUnit::Component(name.clone()),
                    Stage::Lookup,
                    VsaError::Lookup(e.to_string()),
                );
                self.events.emit(&VsaEvent::Failed {
                    unit: err.unit.clone(),
                    stage: err.stage,
                    error: err.source.to_string(),
                });
                return ComponentOutcome::skipped(name, image, &err);
            }
        };

        match self.process_component_vsa(ctx, report, component, &git_url, &digest) {
            Ok(vsa) => ComponentOutcome::attested(name, image, &vsa),
            Err(err) => ComponentOutcome::skipped(name, image, &err),
        }
    }

    fn run_unit(
        &self,
        ctx: &Context,
        unit: VsaUnit,
        generator: &dyn PredicateGenerator,
        subject_url: &str,
        subject_digest: SubjectDigest<'_>,
        location: &str,
    ) -> Result<AttestedVsa, ProcessError> {
        let mut progress = VsaProgress::new(unit.clone());
        debug!(%unit, "processing VSA");

        let predicate = generator
            .generate_predicate(ctx)
            .map_err(|e| self.failed(&mut progress, Stage::Generate, e.into()))?;
        self.advance(&mut progress, VsaState::Generated, Stage::Generate)?;
        self.events.emit(&VsaEvent::Generated {
            unit: unit.clone(),
            passed: predicate.passed(),
        });

        let predicate_path = self
            .writer()
            .write_predicate(&predicate)
            .map_err(|e| self.failed(&mut progress, Stage::Write, e.into()))?;
        self.advance(&mut progress, VsaState::Written, Stage::Write)?;
        self.events.emit(&VsaEvent::Written {
            unit: unit.clone(),
            path: predicate_path.clone(),
        });

        let digest = match subject_digest {
            SubjectDigest::Given(raw) => raw.to_string(),
            SubjectDigest::OfPredicate => predicate_digest(self.fs.as_ref(), &predicate_path)
                .map_err(|source| {
                    let err = VsaError::Digest {
                        path: predicate_path.clone(),
                        source,
                    };
                    self.failed(&mut progress, Stage::Digest, err)
                })?
                .to_string(),
        };

        let attested = Attestor::new(
            &predicate_path,
            subject_url,
            &digest,
            Some(self.signer.clone()),
        )
        .map(|a| a.with_fs(self.fs.clone()).file_mode(self.file_mode))
        .and_then(|attestor| {
            let attested = attest_vsa(ctx, &attestor)?;
            Ok((attestor, attested))
        })
        .map_err(|e| self.failed(&mut progress, Stage::Attest, e.into()))?;
        let (attestor, attested) = attested;
        self.advance(&mut progress, VsaState::Attested, Stage::Attest)?;
        self.events.emit(&VsaEvent::Attested {
            unit: unit.clone(),
            envelope_path: attested.path.clone(),
            key_id: self.signer.key_id(),
        });

        let uploaded_to = self
            .uploader
            .upload(ctx, &attested.envelope, location)
            .map_err(|e| self.failed(&mut progress, Stage::Upload, e.into()))?;
        self.advance(&mut progress, VsaState::Done, Stage::Upload)?;
        self.events.emit(&VsaEvent::Uploaded {
            unit: unit.clone(),
            uploader: self.uploader.name().to_string(),
            location: uploaded_to.clone(),
        });
        debug!(%unit, state = ?progress.state, "VSA processing complete");

        Ok(AttestedVsa {
            unit,
            predicate,
            predicate_path,
            envelope_path: attested.path,
            digest: attestor.digest().clone(),
            location: uploaded_to,
        })
    }

    fn advance(
        &self,
        progress: &mut VsaProgress,
        next: VsaState,
        stage: Stage,
    ) -> Result<(), ProcessError> {
        progress
            .transition(next)
            .map_err(|e| self.failed(progress, stage, e.into()))
    }

    /// Record the failure and wrap it with its unit and stage
    fn failed(&self, progress: &mut VsaProgress, stage: Stage, err: VsaError) -> ProcessError {
        let message = err.to_string();
        // Never terminal here: DONE is only reached after the last stage
        let _ = progress.fail(stage, message.clone());
        self.events.emit(&VsaEvent::Failed {
            unit: progress.unit.clone(),
            stage,
            error: message,
        });
        ProcessError::new(progress.unit.clone(), stage, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attest::{Ed25519Signer, Envelope, SigningError, SubjectMetadata};
    use crate::context::CancelReason;
    use crate::error::ErrorKind;
    use crate::fs::MemFs;
    use crate::upload::{FnUploader, OciUploader, UploadError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vsa_report::Policy;

    fn report(components: Vec<Component>) -> Report {
        Report::new(Policy::named("my-policy"), components)
    }

    fn digest_of(c: &Component) -> String {
        Digest::sha256(c.name.as_bytes()).to_string()
    }

    /// Counts calls and delegates to a real key
    struct SpySigner {
        inner: Ed25519Signer,
        calls: AtomicUsize,
    }

    impl SpySigner {
        fn new() -> Self {
            Self {
                inner: Ed25519Signer::generate(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Signer for SpySigner {
        fn key_id(&self) -> String {
            self.inner.key_id()
        }

        fn sign(&self, content: &[u8], subject: &SubjectMetadata) -> Result<Envelope, SigningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.sign(content, subject)
        }
    }

    fn service(fs: Arc<MemFs>, signer: Arc<SpySigner>, sink: Arc<RecordingSink>) -> Service {
        Service::builder(signer).fs(fs).events(sink).build()
    }

    #[test]
    fn test_component_pipeline_writes_predicate_and_envelope() {
        let fs = Arc::new(MemFs::new());
        let signer = Arc::new(SpySigner::new());
        let sink = Arc::new(RecordingSink::new());
        let svc = service(fs.clone(), signer.clone(), sink.clone());

        let component = Component::new("img1", "reg.io/img1@sha256:ab", true);
        let report = report(vec![component.clone()]);
        let vsa = svc
            .process_component_vsa(&Context::new(), &report, &component, "https://git/img1", &digest_of(&component))
            .unwrap();

        assert_eq!(vsa.predicate.policy_source, "my-policy");
        assert!(vsa.predicate.passed());
        assert_eq!(vsa.predicate_path.file_name().unwrap(), "vsa-img1.json");
        assert_eq!(vsa.envelope_path.file_name().unwrap(), "vsa-img1.intoto.json");
        assert_eq!(vsa.envelope_path.parent(), vsa.predicate_path.parent());
        assert_eq!(vsa.location, "");
        assert_eq!(fs.files().len(), 2);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 1);

        let kinds: Vec<_> = sink
            .events()
            .iter()
            .map(|e| match e {
                VsaEvent::Generated { .. } => "generated",
                VsaEvent::Written { .. } => "written",
                VsaEvent::Attested { .. } => "attested",
                VsaEvent::Uploaded { .. } => "uploaded",
                VsaEvent::Failed { .. } => "failed",
            })
            .collect();
        assert_eq!(kinds, vec!["generated", "written", "attested", "uploaded"]);
    }

    #[test]
    fn test_snapshot_digest_is_digest_of_written_predicate() {
        let fs = Arc::new(MemFs::new());
        let svc = service(fs.clone(), Arc::new(SpySigner::new()), Arc::new(RecordingSink::new()));
        let report = report(vec![Component::new("a", "reg/a", true)]);

        let vsa = svc.process_snapshot_vsa(&Context::new(), &report).unwrap();

        let written = fs.file(&vsa.predicate_path).unwrap();
        assert_eq!(vsa.digest, Digest::sha256(&written.data));
        assert_eq!(vsa.unit, VsaUnit::Snapshot("snapshot".into()));
        assert_eq!(vsa.predicate_path.file_name().unwrap(), "vsa-snapshot.json");
    }

    #[test]
    fn test_invalid_digest_fails_at_attest_stage() {
        let fs = Arc::new(MemFs::new());
        let sink = Arc::new(RecordingSink::new());
        let svc = service(fs.clone(), Arc::new(SpySigner::new()), sink.clone());
        let component = Component::new("img1", "reg/img1", true);
        let report = report(vec![component.clone()]);

        let err = svc
            .process_component_vsa(&Context::new(), &report, &component, "", "not-a-digest")
            .unwrap_err();

        assert_eq!(err.stage, Stage::Attest);
        assert_eq!(err.kind(), ErrorKind::Attestation);
        // predicate remains on disk for inspection
        assert_eq!(fs.files().len(), 1);
        assert_eq!(sink.failures().len(), 1);
    }

    #[test]
    fn test_missing_policy_fails_at_generate_stage() {
        let fs = Arc::new(MemFs::new());
        let svc = service(fs.clone(), Arc::new(SpySigner::new()), Arc::new(RecordingSink::new()));
        let component = Component::new("img1", "reg/img1", true);
        let mut report = report(vec![component.clone()]);
        report.policy = None;

        let err = svc
            .process_component_vsa(&Context::new(), &report, &component, "", &digest_of(&component))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Generate);
        assert!(fs.files().is_empty());
    }

    #[test]
    fn test_upload_not_implemented_is_hard_error() {
        let fs = Arc::new(MemFs::new());
        let svc = Service::builder(Arc::new(SpySigner::new()))
            .fs(fs.clone())
            .uploader(Arc::new(OciUploader))
            .events(Arc::new(RecordingSink::new()))
            .build();
        let component = Component::new("img1", "reg/img1", true);
        let report = report(vec![component.clone()]);

        let err = svc
            .process_component_vsa(&Context::new(), &report, &component, "", &digest_of(&component))
            .unwrap_err();
        assert_eq!(err.stage, Stage::Upload);
        match &err.source {
            VsaError::Upload(e) => assert!(e.is_not_implemented()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_uploader_receives_image_location() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let uploader = FnUploader::new("memory", move |_ctx: &Context, _env: &Envelope, loc: &str| {
            recorder.lock().unwrap().push(loc.to_string());
            Ok::<_, UploadError>(format!("mem://{}", loc))
        });
        let svc = Service::builder(Arc::new(SpySigner::new()))
            .fs(Arc::new(MemFs::new()))
            .uploader(Arc::new(uploader))
            .events(Arc::new(RecordingSink::new()))
            .build();
        let component = Component::new("img1", "reg/img1", true);
        let report = report(vec![component.clone()]);

        let vsa = svc
            .process_component_vsa(&Context::new(), &report, &component, "", &digest_of(&component))
            .unwrap();
        assert_eq!(vsa.location, "mem://reg/img1");
        assert_eq!(*seen.lock().unwrap(), vec!["reg/img1".to_string()]);
    }

    #[test]
    fn test_cancelled_context_stops_before_generation() {
        let fs = Arc::new(MemFs::new());
        let signer = Arc::new(SpySigner::new());
        let svc = service(fs.clone(), signer.clone(), Arc::new(RecordingSink::new()));
        let component = Component::new("img1", "reg/img1", true);
        let report = report(vec![component.clone()]);
        let ctx = Context::new();
        ctx.cancel();

        let err = svc
            .process_component_vsa(&ctx, &report, &component, "", &digest_of(&component))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(matches!(
            err.source,
            VsaError::Generation(crate::predicate::GenerationError::Cancelled(CancelReason::Cancelled))
        ));
        assert!(fs.files().is_empty());
        assert_eq!(signer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_process_all_attempts_every_component() {
        let fs = Arc::new(MemFs::new());
        let signer = Arc::new(SpySigner::new());
        let svc = service(fs.clone(), signer.clone(), Arc::new(RecordingSink::new()));
        let components: Vec<_> = (0..5)
            .map(|i| Component::new(format!("c{}", i), format!("reg/c{}", i), true))
            .collect();
        let report = report(components);

        let git_calls = AtomicUsize::new(0);
        let digest_calls = AtomicUsize::new(0);
        let summary = svc
            .process_all_vsas(
                &Context::new(),
                &report,
                |_c| {
                    git_calls.fetch_add(1, Ordering::SeqCst);
                    String::new()
                },
                |c| {
                    digest_calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(digest_of(c))
                },
            )
            .unwrap();

        assert_eq!(git_calls.load(Ordering::SeqCst), 5);
        assert_eq!(digest_calls.load(Ordering::SeqCst), 5);
        // five components plus the snapshot
        assert_eq!(signer.calls.load(Ordering::SeqCst), 6);
        assert_eq!(summary.attested_count, 5);
        assert_eq!(fs.files().len(), 12);
    }

    #[test]
    fn test_process_all_parallel_keeps_report_order() {
        let fs = Arc::new(MemFs::new());
        let signer = Arc::new(SpySigner::new());
        let svc = Service::builder(signer.clone())
            .fs(fs)
            .events(Arc::new(RecordingSink::new()))
            .parallelism(3)
            .build();
        let components: Vec<_> = (0..7)
            .map(|i| Component::new(format!("c{}", i), format!("reg/c{}", i), i % 2 == 0))
            .collect();
        let report = report(components);

        let summary = svc
            .process_all_vsas(&Context::new(), &report, |_c| String::new(), |c| {
                if c.name == "c4" {
                    Err("registry unreachable")
                } else {
                    Ok(digest_of(c))
                }
            })
            .unwrap();

        let names: Vec<_> = summary.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c0", "c1", "c2", "c3", "c4", "c5", "c6"]);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.components[4].status, OutcomeStatus::Skipped);
        assert_eq!(signer.calls.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_snapshot_failure_fails_batch() {
        let fs = Arc::new(MemFs::new());
        let svc = service(fs, Arc::new(SpySigner::new()), Arc::new(RecordingSink::new()));
        let mut report = report(vec![Component::new("a", "reg/a", true)]);
        report.snapshot = "../escape".to_string();

        let err = svc
            .process_all_vsas(&Context::new(), &report, |_c| String::new(), |c| Ok::<_, String>(digest_of(c)))
            .unwrap_err();
        assert_eq!(err.unit, VsaUnit::Snapshot("../escape".into()));
        assert_eq!(err.stage, Stage::Generate);
    }
}
