//! Stage pipeline.
//!
//! A [`Pipeline`] holds a set of [`Stage`]s. [`Pipeline::plan`] validates the set against
//! a [`ProcessOptions`] once and produces an [`ExecutionPlan`]: the enabled stages sorted
//! by their `order`, ties broken by registration order. Validation rejects:
//!
//! - two stages with the same name
//! - a dependency on a stage that was never registered
//! - stage names in the options that match no stage
//! - dependency cycles
//! - an enabled stage ordered before one of its enabled dependencies
//!
//! A disabled dependency is not an error; the dependent stage simply runs without it.
//!
//! [`Pipeline::execute`] runs a plan. Before each stage the tree and the run context are
//! snapshotted. If the stage returns an error or panics, both are restored; a critical
//! stage then aborts the run with [`LegalMdError::CriticalStage`], any other stage is
//! recorded as failed and the run continues.

pub mod metrics;
pub mod stage;
pub mod stages;

use anyhow::anyhow;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, warn};

pub use metrics::{PipelineReport, StageMetrics};
pub use stage::{Stage, StageContext};
pub use stages::canonical_stages;

use crate::ast::Node;
use crate::config::ProcessOptions;
use crate::core::LegalMdError;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Error => "error",
        })
    }
}

/// A recoverable problem found while processing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub stage: String,
    pub level: DiagnosticLevel,
    pub message: String,
}

/// The stage set cannot run with the given options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineConfigError {
    #[error("stage '{0}' is registered more than once")]
    DuplicateStage(String),

    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    #[error("stage dependencies form a cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("stage '{stage}' is ordered before its dependency '{dependency}'")]
    OrderingViolation { stage: String, dependency: String },

    #[error("options name unknown stage '{0}'")]
    UnknownStage(String),
}

/// Validated stage order for one set of options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    steps: Vec<usize>,
    names: Vec<&'static str>,
}

impl ExecutionPlan {
    /// Names of the stages that will run, in order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }
}

/// An ordered set of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The six built-in stages.
    pub fn canonical() -> Self {
        Self {
            stages: canonical_stages(),
        }
    }

    pub fn register(&mut self, stage: Box<dyn Stage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.name())
    }

    /// Validate the stage set for `options` and fix the execution order.
    pub fn plan(&self, options: &ProcessOptions) -> Result<ExecutionPlan, PipelineConfigError> {
        let mut graph: DiGraph<&'static str, ()> = DiGraph::new();
        let mut nodes: HashMap<&'static str, NodeIndex> = HashMap::new();
        for stage in &self.stages {
            if nodes.insert(stage.name(), graph.add_node(stage.name())).is_some() {
                return Err(PipelineConfigError::DuplicateStage(stage.name().to_string()));
            }
        }

        for stage in &self.stages {
            for dependency in stage.dependencies() {
                let Some(&from) = nodes.get(dependency) else {
                    return Err(PipelineConfigError::UnknownDependency {
                        stage: stage.name().to_string(),
                        dependency: dependency.to_string(),
                    });
                };
                graph.add_edge(from, nodes[stage.name()], ());
            }
        }

        for name in options.disabled_stages.iter().chain(&options.critical_stages) {
            if !nodes.contains_key(name.as_str()) {
                return Err(PipelineConfigError::UnknownStage(name.clone()));
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let members = tarjan_scc(&graph)
                .into_iter()
                .find(|scc| scc.contains(&cycle.node_id()))
                .unwrap_or_else(|| vec![cycle.node_id()]);
            let mut names: Vec<String> = members.iter().map(|&i| graph[i].to_string()).collect();
            names.sort();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            return Err(PipelineConfigError::DependencyCycle(names));
        }

        let mut enabled: Vec<usize> =
            (0..self.stages.len()).filter(|&i| self.stages[i].is_enabled(options)).collect();
        enabled.sort_by_key(|&i| (self.stages[i].order(), i));

        let position: HashMap<&'static str, usize> =
            enabled.iter().enumerate().map(|(pos, &i)| (self.stages[i].name(), pos)).collect();
        for (pos, &i) in enabled.iter().enumerate() {
            let stage = &self.stages[i];
            for dependency in stage.dependencies() {
                if position.get(dependency).is_some_and(|&dep_pos| dep_pos > pos) {
                    return Err(PipelineConfigError::OrderingViolation {
                        stage: stage.name().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        let names: Vec<&'static str> = enabled.iter().map(|&i| self.stages[i].name()).collect();
        debug!("Execution plan: {:?}", names);
        Ok(ExecutionPlan {
            steps: enabled,
            names,
        })
    }

    /// Run `plan` over `root`.
    ///
    /// The plan must come from this pipeline's [`plan`](Self::plan).
    pub fn execute(
        &self,
        plan: &ExecutionPlan,
        root: &mut Node,
        ctx: &mut StageContext<'_>,
    ) -> Result<PipelineReport, LegalMdError> {
        let mut report = PipelineReport::default();

        for &index in &plan.steps {
            let stage = &self.stages[index];
            let name = stage.name();
            let input_size = root.text_size();
            let snapshot = ctx.snapshot(root);

            let started = Instant::now();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.run(root, ctx)))
                .unwrap_or_else(|payload| Err(anyhow!("stage panicked: {}", panic_message(&*payload))));
            let duration = started.elapsed();

            match outcome {
                Ok(fields_touched) => {
                    debug!("Stage '{name}' touched {fields_touched} field(s) in {duration:?}");
                    report.stages.push(StageMetrics {
                        name: name.to_string(),
                        input_size,
                        output_size: root.text_size(),
                        duration,
                        fields_touched,
                        success: true,
                        error: None,
                    });
                }
                Err(err) => {
                    snapshot.restore(root, ctx);
                    let message = format!("{err:#}");
                    if ctx.options.is_stage_critical(name) {
                        error!("Critical stage '{name}' failed: {message}");
                        return Err(LegalMdError::CriticalStage {
                            stage: name.to_string(),
                            message,
                        });
                    }
                    warn!("Stage '{name}' failed and was rolled back: {message}");
                    ctx.diagnose(name, DiagnosticLevel::Error, message.clone());
                    report.stages.push(StageMetrics {
                        name: name.to_string(),
                        input_size,
                        output_size: root.text_size(),
                        duration,
                        fields_touched: 0,
                        success: false,
                        error: Some(message),
                    });
                }
            }
        }
        Ok(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
