//! The stage abstraction and the per-run state stages operate on.

use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::{Diagnostic, DiagnosticLevel};
use crate::ast::Node;
use crate::config::ProcessOptions;
use crate::expression::{EvalContext, HelperRegistry};
use crate::frontmatter::FrontmatterParser;
use crate::imports::FileReader;
use crate::tracking::FieldRegistry;

/// One named transformation step.
///
/// Stages mutate the document tree and the run context in place. Returning an error
/// (or panicking) from a non-critical stage rolls both back to their state before the
/// stage and the run continues.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Position in the canonical order; lower runs first.
    fn order(&self) -> u32;

    /// Stages that must run before this one when they are enabled.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    fn is_enabled(&self, options: &ProcessOptions) -> bool {
        !options.is_stage_disabled(self.name())
    }

    /// Run the stage and return the number of fields it produced or rewrote.
    fn run(&self, root: &mut Node, ctx: &mut StageContext<'_>) -> anyhow::Result<usize>;
}

/// Mutable state owned by a single document run.
///
/// Nothing here outlives the run, so concurrent runs never observe each other.
pub struct StageContext<'a> {
    pub metadata: Value,
    pub registry: FieldRegistry,
    pub diagnostics: Vec<Diagnostic>,
    pub options: &'a ProcessOptions,
    pub helpers: &'a HelperRegistry,
    pub reader: &'a dyn FileReader,
    pub parser: &'a dyn FrontmatterParser,
    /// Path of the main document, when it came from a file.
    pub source_path: Option<PathBuf>,
    pub today: NaiveDate,
}

impl<'a> StageContext<'a> {
    pub fn new(
        metadata: Value,
        options: &'a ProcessOptions,
        helpers: &'a HelperRegistry,
        reader: &'a dyn FileReader,
        parser: &'a dyn FrontmatterParser,
    ) -> Self {
        Self {
            metadata,
            registry: FieldRegistry::new(),
            diagnostics: Vec::new(),
            options,
            helpers,
            reader,
            parser,
            source_path: None,
            today: options.today.unwrap_or_else(|| Local::now().date_naive()),
        }
    }

    pub fn with_source_path(mut self, path: Option<PathBuf>) -> Self {
        self.source_path = path;
        self
    }

    /// Expression context over the current metadata.
    pub fn eval_context(&self) -> EvalContext<'_> {
        EvalContext::new(&self.metadata, self.helpers).with_today(self.today)
    }

    /// Directory `@import` paths resolve against.
    pub fn base_dir(&self) -> PathBuf {
        if let Some(base) = &self.options.base_path {
            return base.clone();
        }
        self.source_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn diagnose(&mut self, stage: &str, level: DiagnosticLevel, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            stage: stage.to_string(),
            level,
            message: message.into(),
        });
    }

    pub(crate) fn snapshot(&self, root: &Node) -> Snapshot {
        Snapshot {
            root: root.clone(),
            metadata: self.metadata.clone(),
            registry: self.registry.clone(),
            diagnostics: self.diagnostics.len(),
        }
    }
}

/// State captured before a stage runs.
pub(crate) struct Snapshot {
    root: Node,
    metadata: Value,
    registry: FieldRegistry,
    diagnostics: usize,
}

impl Snapshot {
    pub(crate) fn restore(self, root: &mut Node, ctx: &mut StageContext<'_>) {
        *root = self.root;
        ctx.metadata = self.metadata;
        ctx.registry = self.registry;
        ctx.diagnostics.truncate(self.diagnostics);
    }
}
