//! Task graph definitions: steps, dependency edges and concurrency eligibility.
//!
//! A `TaskGraph` is validated once, on construction: step ids are unique,
//! every dependency names a step of the same graph, the dependency relation
//! is acyclic and the output step exists. The executor can then schedule it
//! without re-checking any of this.

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Stage;

/// Identity of a step within a stage's task graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    pub id: StepId,
    pub depends_on: Vec<StepId>,
    /// May run alongside other ready steps. A step without this flag runs alone.
    pub concurrent: bool,
}

impl StepSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: StepId::from(id),
            depends_on: Vec::new(),
            concurrent: false,
        }
    }

    pub fn after(mut self, dependencies: &[&str]) -> Self {
        self.depends_on.extend(dependencies.iter().map(|d| StepId::from(*d)));
        self
    }

    pub fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("task graph for the {0} stage has no steps")]
    Empty(Stage),

    #[error("step '{0}' is declared more than once")]
    DuplicateStep(StepId),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: StepId, dependency: StepId },

    #[error("step '{0}' depends on itself")]
    SelfDependency(StepId),

    #[error("dependency cycle through step '{0}'")]
    Cycle(StepId),

    #[error("output step '{0}' is not part of the graph")]
    UnknownOutput(StepId),
}

/// A validated DAG of steps for one stage.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    stage: Stage,
    steps: Vec<StepSpec>,
    /// Step indices in a dependency-respecting order.
    order: Vec<usize>,
    output: StepId,
}

impl TaskGraph {
    pub fn new(stage: Stage, steps: Vec<StepSpec>, output: &str) -> Result<Self, GraphError> {
        if steps.is_empty() {
            return Err(GraphError::Empty(stage));
        }

        let mut index: HashMap<&StepId, usize> = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(&step.id, i).is_some() {
                return Err(GraphError::DuplicateStep(step.id.clone()));
            }
        }

        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::with_capacity(steps.len(), steps.len());
        for i in 0..steps.len() {
            graph.add_node(i);
        }
        for (i, step) in steps.iter().enumerate() {
            for dependency in &step.depends_on {
                if dependency == &step.id {
                    return Err(GraphError::SelfDependency(step.id.clone()));
                }
                let &from = index.get(dependency).ok_or_else(|| GraphError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dependency.clone(),
                })?;
                graph.add_edge(from, i, ());
            }
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| GraphError::Cycle(steps[cycle.node_id()].id.clone()))?;

        let output = StepId::from(output);
        if !index.contains_key(&output) {
            return Err(GraphError::UnknownOutput(output));
        }

        Ok(Self {
            stage,
            steps,
            order,
            output,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> &StepSpec {
        &self.steps[index]
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Indices into `steps()`, every step after all of its dependencies.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn output_step(&self) -> &StepId {
        &self.output
    }
}
