//! Task Graph Executor: runs a stage's steps on a bounded worker pool.
//!
//! Scheduling rules:
//! - a step is dispatched only once every dependency has completed, and it
//!   receives exactly those dependencies' outputs in `StepInput::upstream`;
//! - ready steps marked `concurrent` share the pool (bounded by a semaphore);
//!   a step without the flag runs with nothing else in flight;
//! - after the first failure nothing new is dispatched. Steps already in
//!   flight finish, their outputs are discarded, and every step never
//!   dispatched is reported as skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::llm_client::LlmError;
use crate::models::Stage;
use crate::pipeline::graph::{StepId, TaskGraph};

/// Everything a step sees. There is no other channel between steps.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    pub stage: Stage,
    pub step: StepId,
    /// Shared input for every step of the stage.
    pub stage_input: Value,
    /// Outputs of this step's declared dependencies, keyed by step id.
    pub upstream: BTreeMap<StepId, Value>,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("model output did not contain a JSON object: {0}")]
    MalformedOutput(String),

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

/// The model-invocation collaborator. Output is untrusted.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, input: StepInput) -> Result<Value, GenerateError>;
}

/// Outputs of a fully executed stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutputs {
    outputs: BTreeMap<StepId, Value>,
    output_step: StepId,
}

impl StageOutputs {
    pub fn get(&self, step: &StepId) -> Option<&Value> {
        self.outputs.get(step)
    }

    pub fn output_step(&self) -> &StepId {
        &self.output_step
    }

    /// The output step's payload.
    pub fn into_output(mut self) -> (StepId, Value) {
        let value = self.outputs.remove(&self.output_step).unwrap_or(Value::Null);
        (self.output_step, value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub step: StepId,
    pub message: String,
    /// Steps never dispatched because the run was abandoned.
    pub skipped: Vec<StepId>,
    /// Steps that were in flight at the failure and whose outputs were dropped.
    pub discarded: Vec<StepId>,
}

pub struct TaskGraphExecutor {
    generator: Arc<dyn Generator>,
    permits: Arc<Semaphore>,
}

impl TaskGraphExecutor {
    pub fn new(generator: Arc<dyn Generator>, max_parallel_steps: usize) -> Self {
        Self {
            generator,
            permits: Arc::new(Semaphore::new(max_parallel_steps.max(1))),
        }
    }

    pub async fn execute(
        &self,
        graph: &TaskGraph,
        stage_input: &Value,
    ) -> Result<StageOutputs, ExecutionFailure> {
        let stage = graph.stage();
        let mut pending: Vec<usize> = graph.order().to_vec();
        let mut completed: BTreeMap<StepId, Value> = BTreeMap::new();
        let mut in_flight = FuturesUnordered::new();
        let mut exclusive_in_flight = false;
        let mut failure: Option<(StepId, String)> = None;
        let mut discarded = Vec::new();

        loop {
            if failure.is_none() && !exclusive_in_flight {
                let mut i = 0;
                while i < pending.len() {
                    let spec = graph.step(pending[i]);
                    let ready = spec.depends_on.iter().all(|d| completed.contains_key(d));
                    if !ready || (!spec.concurrent && !in_flight.is_empty()) {
                        i += 1;
                        continue;
                    }
                    pending.remove(i);

                    let input = StepInput {
                        stage,
                        step: spec.id.clone(),
                        stage_input: stage_input.clone(),
                        upstream: spec
                            .depends_on
                            .iter()
                            .filter_map(|d| completed.get(d).map(|v| (d.clone(), v.clone())))
                            .collect(),
                    };
                    debug!(%stage, step = %spec.id, concurrent = spec.concurrent, "dispatching step");

                    let generator = Arc::clone(&self.generator);
                    let permits = Arc::clone(&self.permits);
                    let handle = tokio::spawn(async move {
                        let _permit = permits
                            .acquire_owned()
                            .await
                            .map_err(|_| GenerateError::Unavailable("worker pool closed".into()))?;
                        generator.generate(input).await
                    });
                    let step = spec.id.clone();
                    let concurrent = spec.concurrent;
                    in_flight.push(async move { (step, concurrent, handle.await) });

                    if !concurrent {
                        exclusive_in_flight = true;
                        break;
                    }
                }
            }

            let Some((step, concurrent, joined)) = in_flight.next().await else {
                break;
            };
            if !concurrent {
                exclusive_in_flight = false;
            }

            let result = match joined {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_error) => Err(format!("step task aborted: {join_error}")),
            };

            match (result, failure.is_some()) {
                (Ok(_), true) => {
                    debug!(%stage, %step, "discarding output of step finished after failure");
                    discarded.push(step);
                }
                (Ok(value), false) => {
                    debug!(%stage, %step, "step completed");
                    completed.insert(step, value);
                }
                (Err(message), true) => {
                    warn!(%stage, %step, error = %message, "step failed after run was abandoned");
                    discarded.push(step);
                }
                (Err(message), false) => {
                    warn!(%stage, %step, error = %message, "step failed; abandoning stage");
                    failure = Some((step, message));
                }
            }
        }

        if let Some((step, message)) = failure {
            return Err(ExecutionFailure {
                step,
                message,
                skipped: pending.iter().map(|&i| graph.step(i).id.clone()).collect(),
                discarded,
            });
        }

        Ok(StageOutputs {
            outputs: completed,
            output_step: graph.output_step().clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    enum Reply {
        Value(Value),
        Fail(String),
    }

    /// Deterministic generator: a fixed reply per step id, optional delay,
    /// records every input it receives.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        replies: HashMap<String, Reply>,
        delays: HashMap<String, Duration>,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        inputs: Mutex<Vec<StepInput>>,
    }

    impl ScriptedGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, step: &str, value: Value) -> Self {
            self.replies.insert(step.to_string(), Reply::Value(value));
            self
        }

        pub fn fail(mut self, step: &str, message: &str) -> Self {
            self.replies.insert(step.to_string(), Reply::Fail(message.to_string()));
            self
        }

        pub fn delay(mut self, step: &str, delay: Duration) -> Self {
            self.delays.insert(step.to_string(), delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn max_active(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }

        pub fn inputs(&self) -> Vec<StepInput> {
            self.inputs.lock().clone()
        }

        pub fn input_for(&self, step: &str) -> Option<StepInput> {
            self.inputs.lock().iter().find(|i| i.step.as_str() == step).cloned()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, input: StepInput) -> Result<Value, GenerateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.inputs.lock().push(input.clone());

            if let Some(delay) = self.delays.get(input.step.as_str()) {
                tokio::time::sleep(*delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            match self.replies.get(input.step.as_str()) {
                Some(Reply::Value(v)) => Ok(v.clone()),
                Some(Reply::Fail(message)) => Err(GenerateError::Unavailable(message.clone())),
                None => Ok(serde_json::json!({ "step": input.step.as_str() })),
            }
        }
    }
}
