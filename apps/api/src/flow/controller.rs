//! Flow Controller: drives one request through fingerprinting, the cache,
//! the stage pipelines, the guardrails and persistence.
//!
//! Stages run strictly one after the other. The site stage is built from the
//! document stage's `AcceptedResult`, never from raw output. Nothing touches
//! the cache or the artifact sink until every executed stage was accepted.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::{build_artifacts, ArtifactRef, ArtifactSink, BuildContext};
use crate::cache::{CacheEntry, CacheStore, FingerprintLocks};
use crate::documents::{DocumentStore, SourceDocument};
use crate::errors::FlowError;
use crate::flow::fingerprint::{Fingerprint, FingerprintEngine, SourceDigest};
use crate::flow::request::{PathSelector, Request};
use crate::flow::state_machine::{FlowState, RunMachine};
use crate::guardrails::text::normalize_text;
use crate::guardrails::{accept, GuardrailSet, GuardrailSettings, ValidationContext, ValidationOutcome};
use crate::models::{AcceptedResult, GenerationResult, Provenance, Stage};
use crate::pipeline::definitions::{document_stage_input, graph_for, site_stage_input};
use crate::pipeline::{Generator, TaskGraph, TaskGraphExecutor};

pub const DEFAULT_FLOW_VERSION: &str = "resume-flow-v2";

/// Injected configuration. The controller never reads the environment.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    /// Part of every fingerprint; bump it when pipeline definitions change.
    pub flow_version: String,
    pub guardrails: GuardrailSettings,
    pub max_parallel_steps: usize,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            flow_version: DEFAULT_FLOW_VERSION.to_string(),
            guardrails: GuardrailSettings::default(),
            max_parallel_steps: 4,
        }
    }
}

/// External capabilities the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn Generator>,
    pub cache: Arc<dyn CacheStore>,
    pub sink: Arc<dyn ArtifactSink>,
    pub documents: Arc<dyn DocumentStore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowOutcome {
    Done { artifacts: Vec<ArtifactRef> },
    CacheHit { artifacts: Vec<ArtifactRef> },
    /// A stage was rejected. Carries every failed validation outcome.
    Failed { stage: Stage, outcomes: Vec<ValidationOutcome> },
}

impl FlowOutcome {
    pub fn artifacts(&self) -> &[ArtifactRef] {
        match self {
            FlowOutcome::Done { artifacts } | FlowOutcome::CacheHit { artifacts } => artifacts,
            FlowOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FlowOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub run_id: Uuid,
    pub path: PathSelector,
    pub fingerprint: Fingerprint,
    pub outcome: FlowOutcome,
    pub transitions: Vec<FlowState>,
}

enum StageVerdict {
    Accepted(AcceptedResult),
    Rejected(Vec<ValidationOutcome>),
}

pub struct FlowController {
    settings: FlowSettings,
    fingerprints: FingerprintEngine,
    guardrails: Arc<GuardrailSet>,
    executor: TaskGraphExecutor,
    document_graph: TaskGraph,
    site_graph: TaskGraph,
    cache: Arc<dyn CacheStore>,
    sink: Arc<dyn ArtifactSink>,
    documents: Arc<dyn DocumentStore>,
    locks: FingerprintLocks,
}

impl FlowController {
    pub fn new(settings: FlowSettings, collaborators: Collaborators) -> Result<Self, FlowError> {
        Ok(Self {
            fingerprints: FingerprintEngine::new(settings.flow_version.clone()),
            guardrails: Arc::new(GuardrailSet::standard()),
            executor: TaskGraphExecutor::new(collaborators.generator, settings.max_parallel_steps),
            document_graph: graph_for(Stage::Document)?,
            site_graph: graph_for(Stage::Site)?,
            cache: collaborators.cache,
            sink: collaborators.sink,
            documents: collaborators.documents,
            locks: FingerprintLocks::new(),
            settings,
        })
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub async fn run(&self, request: Request) -> Result<FlowReport, FlowError> {
        let run_id = Uuid::new_v4();
        let mut machine = RunMachine::new(run_id);
        info!(%run_id, path = %request.path, source = %request.source_ref, "flow started");

        match self.drive(run_id, &request, &mut machine).await {
            Ok((fingerprint, outcome)) => {
                info!(%run_id, fingerprint = %fingerprint.short(), state = %machine.state(), "flow finished");
                Ok(FlowReport {
                    run_id,
                    path: request.path,
                    fingerprint,
                    outcome,
                    transitions: machine.history().to_vec(),
                })
            }
            Err(e) => {
                machine.fail();
                warn!(%run_id, error = %e, "flow aborted");
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        run_id: Uuid,
        request: &Request,
        machine: &mut RunMachine,
    ) -> Result<(Fingerprint, FlowOutcome), FlowError> {
        let source = self.documents.read(&request.source_ref).await?;
        let source_digest = SourceDigest::of(&source.bytes);
        let fingerprint = self
            .fingerprints
            .compute(&source_digest, &request.user_request, request.path);
        machine.set_fingerprint(fingerprint.clone());
        machine.advance(FlowState::FingerprintComputed)?;

        // Held until this run is persisted; a concurrent identical request waits here.
        let _flight = self.locks.acquire(&fingerprint).await;

        let cached = self.cache.lookup(&fingerprint).await?;
        machine.advance(FlowState::CacheChecked)?;

        if let Some(entry) = cached {
            info!(fingerprint = %fingerprint.short(), backend = self.cache.backend(), "cache hit");
            self.restore_missing_artifacts(&entry).await?;
            machine.advance(FlowState::Done)?;
            return Ok((
                fingerprint,
                FlowOutcome::CacheHit {
                    artifacts: entry.artifacts,
                },
            ));
        }
        info!(fingerprint = %fingerprint.short(), backend = self.cache.backend(), "cache miss");

        let document_input = document_stage_input(&source.text, &request.user_request);
        let revision = match self
            .run_stage(run_id, machine, &self.document_graph, document_input, &source.text)
            .await?
        {
            StageVerdict::Accepted(accepted) => accepted,
            StageVerdict::Rejected(outcomes) => {
                machine.advance(FlowState::Failed)?;
                return Ok((
                    fingerprint,
                    FlowOutcome::Failed {
                        stage: Stage::Document,
                        outcomes,
                    },
                ));
            }
        };

        let mut accepted = vec![revision];

        if request.path == PathSelector::ReviseAndPublish {
            let revised = accepted[0]
                .as_revision()
                .ok_or_else(|| FlowError::Internal("document stage produced no revision".into()))?;
            let site_input = site_stage_input(revised, &request.user_request);
            let ground_truth = revised.final_resume_text.clone();

            match self
                .run_stage(run_id, machine, &self.site_graph, site_input, &ground_truth)
                .await?
            {
                StageVerdict::Accepted(site) => accepted.push(site),
                StageVerdict::Rejected(outcomes) => {
                    machine.advance(FlowState::Failed)?;
                    return Ok((
                        fingerprint,
                        FlowOutcome::Failed {
                            stage: Stage::Site,
                            outcomes,
                        },
                    ));
                }
            }
        }

        machine.advance(FlowState::Persisting)?;
        let artifacts = self
            .persist(request, &fingerprint, &source, source_digest, accepted)
            .await?;
        machine.advance(FlowState::Done)?;

        Ok((fingerprint, FlowOutcome::Done { artifacts }))
    }

    /// Executing(stage) → Validating(stage) → Accepted(stage) | Rejected(stage).
    async fn run_stage(
        &self,
        run_id: Uuid,
        machine: &mut RunMachine,
        graph: &TaskGraph,
        stage_input: Value,
        ground_truth: &str,
    ) -> Result<StageVerdict, FlowError> {
        let stage = graph.stage();
        machine.advance(FlowState::Executing(stage))?;

        let outputs = self
            .executor
            .execute(graph, &stage_input)
            .await
            .map_err(|failure| FlowError::StepExecutionFailure {
                stage,
                step: failure.step,
                message: failure.message,
                skipped: failure.skipped,
            })?;
        let (step, payload) = outputs.into_output();

        let result = GenerationResult::new(
            normalize_payload(stage, payload),
            Provenance {
                run_id,
                stage,
                step,
                produced_at: Utc::now(),
            },
        );

        machine.advance(FlowState::Validating(stage))?;
        let guardrails = Arc::clone(&self.guardrails);
        let settings = self.settings.guardrails.clone();
        let ground_truth = ground_truth.to_string();
        let (result, outcomes) = tokio::task::spawn_blocking(move || {
            let ctx = ValidationContext {
                ground_truth: &ground_truth,
                settings: &settings,
            };
            let outcomes = guardrails.run(&result, &ctx);
            (result, outcomes)
        })
        .await
        .map_err(|e| FlowError::Internal(format!("guardrail task failed: {e}")))?;

        match accept(result, outcomes) {
            Ok(accepted) => {
                machine.advance(FlowState::Accepted(stage))?;
                info!(%run_id, %stage, "stage accepted");
                Ok(StageVerdict::Accepted(accepted))
            }
            Err(failed) => {
                machine.advance(FlowState::Rejected(stage))?;
                let problems: Vec<String> = failed
                    .iter()
                    .flat_map(|o| o.violations.iter().map(|v| format!("{}: {}", o.validator, v.describe())))
                    .collect();
                warn!(%run_id, %stage, violations = ?problems, "stage rejected by guardrails");
                Ok(StageVerdict::Rejected(failed))
            }
        }
    }

    /// Stores the cache entry, then writes the artifact batch.
    async fn persist(
        &self,
        request: &Request,
        fingerprint: &Fingerprint,
        source: &SourceDocument,
        source_digest: SourceDigest,
        results: Vec<AcceptedResult>,
    ) -> Result<Vec<ArtifactRef>, FlowError> {
        let created_at = Utc::now();
        let rendered = self.documents.render(revised_text(&results));
        let artifacts = build_artifacts(
            &results,
            rendered,
            &BuildContext {
                fingerprint,
                flow_version: &self.settings.flow_version,
                selector: request.path,
                source_digest: &source_digest,
                created_at,
            },
        );
        let planned = self.sink.plan(&artifacts);

        self.cache
            .store(CacheEntry {
                fingerprint: fingerprint.clone(),
                flow_version: self.settings.flow_version.clone(),
                selector: request.path,
                source_ref: source.source_ref.clone(),
                source_digest,
                results,
                artifacts: planned,
                created_at,
            })
            .await?;

        Ok(self.sink.write_batch(artifacts).await?)
    }

    /// Rewrites cached artifacts that are missing or changed on the sink,
    /// from the cached accepted results. No executor, no guardrails.
    async fn restore_missing_artifacts(&self, entry: &CacheEntry) -> Result<(), FlowError> {
        let mut missing = HashSet::new();
        for reference in &entry.artifacts {
            if !self.sink.contains(reference).await {
                missing.insert(reference.kind);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let rendered = self.documents.render(revised_text(&entry.results));
        let rebuilt: Vec<_> = build_artifacts(
            &entry.results,
            rendered,
            &BuildContext {
                fingerprint: &entry.fingerprint,
                flow_version: &entry.flow_version,
                selector: entry.selector,
                source_digest: &entry.source_digest,
                created_at: entry.created_at,
            },
        )
        .into_iter()
        .filter(|a| missing.contains(&a.kind))
        .collect();

        warn!(
            fingerprint = %entry.fingerprint.short(),
            count = rebuilt.len(),
            "re-materializing cached artifacts missing from the sink"
        );
        self.sink.write_batch(rebuilt).await?;
        Ok(())
    }
}

fn revised_text(results: &[AcceptedResult]) -> &str {
    results
        .iter()
        .find_map(AcceptedResult::as_revision)
        .map(|r| r.final_resume_text.as_str())
        .unwrap_or_default()
}

/// Document text is normalized before validation so the guardrails and the
/// artifacts see the same text.
fn normalize_payload(stage: Stage, mut payload: Value) -> Value {
    if stage == Stage::Document {
        if let Some(text) = payload.get("final_resume_text").and_then(Value::as_str) {
            let normalized = normalize_text(text);
            payload["final_resume_text"] = Value::String(normalized);
        }
    }
    payload
}
