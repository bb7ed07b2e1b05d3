//! Per-file evaluation pipeline and the worker pool that drives it
//!
//! Each file walks `Discovered -> ToolsRun -> EvidenceFiltered -> Retrieved
//! -> Detected -> Judged -> Scored`, and the run marks it `Reported` once
//! every file is terminal. Any [`FatalError`] moves the file to `Failed`
//! without touching its siblings.

use crate::agent;
use crate::config::{Config, ToolSettings};
use crate::error::FatalError;
use crate::model::{EvaluationResult, EvaluationTarget, Stage};
use crate::profile::ProfileRegistry;
use crate::reasoning::{ReasoningClient, RetryPolicy, RetryingClient};
use crate::retrieval::{gather, Retriever};
use crate::util::absolute_path;
use std::any::Any;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::Instrument;

/// Language tag of a file whose profile never resolved
const UNKNOWN_LANGUAGE: &str = "unknown";

/// Note recorded when a file had to be decoded lossily
const LOSSY_SOURCE_NOTE: &str = "source contained invalid UTF-8; replaced";

type WorkQueue = Arc<Mutex<VecDeque<(usize, PathBuf)>>>;
type Finished = mpsc::UnboundedSender<(usize, EvaluationResult)>;

/// Mutable bookkeeping for one file as it moves through the stages.
struct FileRun {
    file: PathBuf,
    language: &'static str,
    stage: Stage,
    notes: Vec<String>,
}

impl FileRun {
    fn new(file: PathBuf) -> Self {
        Self {
            file,
            language: UNKNOWN_LANGUAGE,
            stage: Stage::Discovered,
            notes: Vec::new(),
        }
    }

    fn advance(&mut self, next: Stage) {
        tracing::debug!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(self, err: FatalError) -> EvaluationResult {
        tracing::warn!(stage = %self.stage, error = %err, "evaluation failed");
        let mut result = EvaluationResult::failed(self.file, self.language, err.to_string());
        result.notes = self.notes;
        result.notes.push(format!("aborted after stage {}", self.stage));
        result
    }
}

/// Text carried by a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

fn join_failure(err: tokio::task::JoinError) -> FatalError {
    if err.is_panic() {
        FatalError::Panicked(panic_message(err.into_panic()))
    } else {
        FatalError::Panicked(err.to_string())
    }
}

/// Decode file bytes, replacing invalid UTF-8 sequences.
fn decode_source(bytes: Vec<u8>) -> (String, bool) {
    match String::from_utf8(bytes) {
        Ok(text) => (text, false),
        Err(err) => (String::from_utf8_lossy(err.as_bytes()).into_owned(), true),
    }
}

/// One result per input file in input order. A file whose result never
/// arrived is reported as a failure.
fn assemble(files: &[PathBuf], finished: Vec<(usize, EvaluationResult)>) -> Vec<EvaluationResult> {
    let mut slots: Vec<Option<EvaluationResult>> = files.iter().map(|_| None).collect();
    for (index, result) in finished {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(result);
        }
    }
    slots
        .into_iter()
        .zip(files)
        .map(|(slot, file)| match slot {
            Some(mut result) => {
                if !result.is_failed() {
                    result.stage = Stage::Reported;
                }
                result
            }
            None => FileRun::new(absolute_path(file)).fail(FatalError::Panicked(
                "worker stopped before reporting this file".to_string(),
            )),
        })
        .collect()
}

/// Runs files through the pipeline on a bounded pool of workers.
/// Cloning is cheap; every clone shares the same registry, client and index.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<ProfileRegistry>,
    client: Arc<dyn ReasoningClient>,
    retriever: Option<Arc<dyn Retriever>>,
    tools: ToolSettings,
    top_k: usize,
    retrieval_timeout: Duration,
    workers: usize,
    language: Option<String>,
}

impl Orchestrator {
    /// Orchestrator with default settings and no retrieval. `client` is used
    /// as given; wrap it in a [`RetryingClient`] to get retries.
    pub fn new(registry: Arc<ProfileRegistry>, client: Arc<dyn ReasoningClient>) -> Self {
        let defaults = Config::default();
        Self {
            registry,
            client,
            retriever: None,
            tools: defaults.tools,
            top_k: defaults.retrieval.top_k,
            retrieval_timeout: defaults.retrieval.timeout(),
            workers: defaults.workers,
            language: None,
        }
    }

    /// Orchestrator configured from `config`, retrying `transport` per the
    /// configured policy.
    pub fn from_config(
        config: &Config,
        registry: Arc<ProfileRegistry>,
        transport: Arc<dyn ReasoningClient>,
    ) -> Self {
        let client = RetryingClient::new(transport, RetryPolicy::from_settings(&config.llm));
        Self {
            tools: config.tools.clone(),
            top_k: config.retrieval.top_k.max(1),
            retrieval_timeout: config.retrieval.timeout(),
            workers: config.workers.max(1),
            ..Self::new(registry, Arc::new(client))
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn without_retrieval(mut self) -> Self {
        self.retriever = None;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Force one profile for every file instead of detecting by extension.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_tool_settings(mut self, tools: ToolSettings) -> Self {
        self.tools = tools;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Evaluate `files` and return one result per file in input order.
    /// Returns only after every file is terminal.
    pub async fn run(&self, files: Vec<PathBuf>) -> Vec<EvaluationResult> {
        let total = files.len();
        if total == 0 {
            return Vec::new();
        }
        let queue: WorkQueue = Arc::new(Mutex::new(files.iter().cloned().enumerate().collect()));
        let pool = self.workers.clamp(1, total);
        tracing::info!(files = total, workers = pool, "evaluation started");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handles: Vec<_> = (0..pool)
            .map(|worker| {
                let this = self.clone();
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                tokio::spawn(async move { this.drain(worker, queue, tx).await })
            })
            .collect();
        drop(tx);

        for joined in futures::future::join_all(handles).await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "worker terminated abnormally");
            }
        }

        let mut finished = Vec::with_capacity(total);
        while let Some(done) = rx.recv().await {
            finished.push(done);
        }
        assemble(&files, finished)
    }

    /// Worker loop: take the next file, finish it, repeat until the queue is
    /// empty. Each result is sent as soon as it is terminal.
    async fn drain(self, worker: usize, queue: WorkQueue, finished: Finished) {
        loop {
            let Some((index, path)) = queue.lock().await.pop_front() else {
                break;
            };
            tracing::debug!(worker, file = %path.display(), "file dequeued");
            let result = self.evaluate_isolated(path).await;
            if finished.send((index, result)).is_err() {
                break;
            }
        }
    }

    /// Evaluate one file on its own task so a panic anywhere in its
    /// pipeline becomes that file's fatal error.
    async fn evaluate_isolated(&self, path: PathBuf) -> EvaluationResult {
        let this = self.clone();
        let span = tracing::info_span!("evaluate", file = %path.display());
        let task_path = path.clone();
        let handle = tokio::spawn(async move { this.evaluate(&task_path).await }.instrument(span));
        match handle.await {
            Ok(result) => result,
            Err(err) => FileRun::new(absolute_path(&path)).fail(join_failure(err)),
        }
    }

    /// Run the full pipeline for one file.
    pub async fn evaluate(&self, path: &Path) -> EvaluationResult {
        let mut run = FileRun::new(absolute_path(path));
        match self.pipeline(&mut run).await {
            Ok(result) => result,
            Err(err) => run.fail(err),
        }
    }

    async fn pipeline(&self, run: &mut FileRun) -> Result<EvaluationResult, FatalError> {
        let profile = self.registry.resolve(&run.file, self.language.as_deref())?;
        run.language = profile.name();

        let read_path = run.file.clone();
        let bytes = tokio::task::spawn_blocking(move || std::fs::read(read_path))
            .await
            .map_err(join_failure)??;
        let (source, lossy) = decode_source(bytes);
        if lossy {
            tracing::warn!("invalid UTF-8 in source; decoded lossily");
            run.notes.push(LOSSY_SOURCE_NOTE.to_string());
        }
        if source.trim().is_empty() {
            return Err(FatalError::Empty);
        }
        let target = Arc::new(EvaluationTarget::new(
            run.file.clone(),
            source,
            profile.name(),
        ));

        let raw = {
            let profile = Arc::clone(&profile);
            let target = Arc::clone(&target);
            let settings = self.tools.clone();
            tokio::task::spawn_blocking(move || profile.run_tools(&target, &settings))
                .await
                .map_err(join_failure)?
        };
        run.advance(Stage::ToolsRun);

        let evidence = profile.filter(raw);
        for failed in evidence.failed_tools() {
            run.notes.push(format!(
                "tool {}: {}",
                failed.tool,
                failed.error.as_deref().unwrap_or_default()
            ));
        }
        tracing::debug!(findings = evidence.finding_count(), "evidence filtered");
        run.advance(Stage::EvidenceFiltered);

        let guidance = self.retrieve(profile.derive_queries(&target.source), run).await;
        run.advance(Stage::Retrieved);

        let prompt = profile.detective_prompt(&target, &evidence, &guidance);
        let detective = agent::detect(self.client.as_ref(), &prompt)
            .await
            .map_err(|source| FatalError::Reasoning {
                stage: "detective",
                source,
            })?;
        run.notes.extend(detective.notes);
        run.advance(Stage::Detected);

        let prompt = profile.judge_prompt(&target, &detective.candidates, &evidence);
        let verdict = agent::judge(self.client.as_ref(), &prompt, &target.source)
            .await
            .map_err(|source| FatalError::Reasoning {
                stage: "judge",
                source,
            })?;
        run.notes.extend(verdict.notes);
        run.advance(Stage::Judged);

        let score = profile.score(&verdict.violations, &evidence);
        run.advance(Stage::Scored);
        tracing::info!(
            score,
            violations = verdict.violations.len(),
            degraded = verdict.degraded,
            "file scored"
        );

        Ok(EvaluationResult {
            file: run.file.clone(),
            language: profile.name().to_string(),
            score: Some(score),
            summary: verdict.summary,
            violations: verdict.violations,
            judge_degraded: verdict.degraded,
            notes: std::mem::take(&mut run.notes),
            stage: run.stage,
            error: None,
        })
    }

    /// Guidance chunks for `queries`. Never fails: a timeout or a crashed
    /// retriever yields no guidance and a note.
    async fn retrieve(&self, queries: Vec<String>, run: &mut FileRun) -> Vec<String> {
        let Some(retriever) = self.retriever.clone() else {
            return Vec::new();
        };
        let top_k = self.top_k;
        let lookup = tokio::task::spawn_blocking(move || gather(retriever.as_ref(), &queries, top_k));
        match tokio::time::timeout(self.retrieval_timeout, lookup).await {
            Ok(Ok(chunks)) => {
                tracing::debug!(chunks = chunks.len(), "guidance retrieved");
                chunks
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "retrieval failed; continuing without guidance");
                run.notes.push(format!("retrieval: failed ({})", err));
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.retrieval_timeout.as_secs(),
                    "retrieval timed out; continuing without guidance"
                );
                run.notes.push("retrieval: timed out".to_string());
                Vec::new()
            }
        }
    }
}
