//! The processing entry point.
//!
//! An [`Engine`] is built once per set of options. Building it validates the stage
//! pipeline, so configuration errors surface before any document is read. Each call to
//! [`Engine::process`] then owns a fresh AST, metadata map and field registry; an engine
//! can be shared across threads and used for many documents without runs observing
//! each other.
//!
//! # Examples
//!
//! ```rust,no_run
//! use legal_md::config::ProcessOptions;
//! use legal_md::engine::Engine;
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = Engine::new(ProcessOptions::default())?;
//! let doc = engine.process("---\nclient: Acme\n---\nServices for {{client}}.")?;
//! assert_eq!(doc.resolved_text, "Services for Acme.");
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::ast::parse_body;
use crate::config::ProcessOptions;
use crate::core::LegalMdError;
use crate::expression::HelperRegistry;
use crate::frontmatter::{FrontmatterParser, YamlFrontmatter, merge};
use crate::imports::{FileReader, FsReader};
use crate::pipeline::{
    Diagnostic, DiagnosticLevel, ExecutionPlan, Pipeline, PipelineReport, StageContext,
};
use crate::tracking::{FieldReport, strip_markers};

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    pub resolved_text: String,
    /// Final metadata, including `_cross_references`.
    pub metadata: Value,
    pub field_report: FieldReport,
    pub stage_metrics: PipelineReport,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProcessedDocument {
    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level >= DiagnosticLevel::Warning)
    }
}

pub struct Engine {
    options: ProcessOptions,
    pipeline: Pipeline,
    plan: ExecutionPlan,
    helpers: HelperRegistry,
    reader: Box<dyn FileReader + Send + Sync>,
    parser: Box<dyn FrontmatterParser + Send + Sync>,
}

impl Engine {
    /// Engine over the canonical stages, reading imports from disk.
    pub fn new(options: ProcessOptions) -> Result<Self, LegalMdError> {
        Self::with_pipeline(options, Pipeline::canonical())
    }

    /// Engine over a custom stage set.
    pub fn with_pipeline(options: ProcessOptions, pipeline: Pipeline) -> Result<Self, LegalMdError> {
        let plan = pipeline.plan(&options)?;
        debug!("Engine ready with stages: {}", plan.names().join(" -> "));
        Ok(Self {
            options,
            pipeline,
            plan,
            helpers: HelperRegistry::builtin(),
            reader: Box::new(FsReader),
            parser: Box::new(YamlFrontmatter),
        })
    }

    pub fn with_reader(mut self, reader: impl FileReader + Send + Sync + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    pub fn with_parser(mut self, parser: impl FrontmatterParser + Send + Sync + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_helpers(mut self, helpers: HelperRegistry) -> Self {
        self.helpers = helpers;
        self
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Process raw document text. Imports resolve against `base-path` or the working directory.
    pub fn process(&self, raw: &str) -> Result<ProcessedDocument, LegalMdError> {
        self.run(raw, None, None)
    }

    /// Read and process a document; its imports resolve relative to its directory.
    pub fn process_file(&self, path: &Path) -> Result<ProcessedDocument, LegalMdError> {
        let raw = self.reader.read_to_string(path).map_err(|e| {
            debug!("Reading {} failed: {e}", path.display());
            LegalMdError::FileSystem {
                operation: "read document".to_string(),
                path: path.display().to_string(),
            }
        })?;
        self.run(&raw, Some(path.to_path_buf()), None)
    }

    /// Process with caller metadata that ranks below the document and above imports.
    pub fn process_with_metadata(
        &self,
        raw: &str,
        extra: &Value,
    ) -> Result<ProcessedDocument, LegalMdError> {
        self.run(raw, None, Some(extra))
    }

    fn run(
        &self,
        raw: &str,
        source_path: Option<PathBuf>,
        extra: Option<&Value>,
    ) -> Result<ProcessedDocument, LegalMdError> {
        let parsed = self.parser.parse(raw);
        let mut notes = Vec::new();
        if let Some(warning) = parsed.warning {
            warn!("{warning}");
            notes.push(warning);
        }

        let mut metadata = parsed.metadata;
        if let Some(extra) = extra {
            let merged = merge(&metadata, extra, &self.options.merge_options())?;
            for key in &merged.filtered {
                notes.push(format!("Extra metadata may not set reserved key '{key}'; ignored"));
            }
            metadata = merged.merged;
        }

        let mut root = parse_body(&parsed.body, None);
        let mut ctx = StageContext::new(
            metadata,
            &self.options,
            &self.helpers,
            self.reader.as_ref(),
            self.parser.as_ref(),
        )
        .with_source_path(source_path);
        for note in notes {
            ctx.diagnose("frontmatter", DiagnosticLevel::Warning, note);
        }

        let stage_metrics = self.pipeline.execute(&self.plan, &mut root, &mut ctx)?;
        debug!(
            "Processed document in {:?} ({} field(s), {} diagnostic(s))",
            stage_metrics.total_duration(),
            ctx.registry.len(),
            ctx.diagnostics.len()
        );

        Ok(ProcessedDocument {
            resolved_text: strip_markers(&root.render()),
            metadata: ctx.metadata,
            field_report: ctx.registry.report(),
            stage_metrics,
            diagnostics: ctx.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::MemoryReader;
    use crate::tracking::FieldStatus;
    use chrono::NaiveDate;
    use serde_json::json;

    fn options() -> ProcessOptions {
        ProcessOptions {
            today: NaiveDate::from_ymd_opt(2024, 1, 15),
            ..ProcessOptions::default()
        }
    }

    const CONTRACT: &str = "---\nclient:\n  name: Acme Corp\nfee: 1500\narbitration: true\nlevel-one: \"Article %n.\"\nlevel-two: \"Section %n.\"\n---\nl. Services\nll. Payment |payment|\n{{client.name}} pays {{formatCurrency(fee, \"USD\")}}.\nll. Disputes\nDisputes follow |payment|[ and go to arbitration]{arbitration}.";

    #[test]
    fn test_full_document() {
        let engine = Engine::new(options()).unwrap();
        let doc = engine.process(CONTRACT).unwrap();

        assert_eq!(
            doc.resolved_text,
            "Article 1. Services\nSection 1. Payment\nAcme Corp pays $1,500.00.\nSection 2. Disputes\nDisputes follow Section 1. and go to arbitration."
        );
        let report = &doc.field_report;
        assert_eq!((report.total, report.filled, report.logic), (3, 1, 2));
        assert_eq!(doc.metadata["_cross_references"][0]["sectionText"], "Section 1. Payment");
        assert!(doc.stage_metrics.stages.iter().all(|s| s.success));
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn test_resolved_text_is_a_fixed_point() {
        let engine = Engine::new(options()).unwrap();
        let first = engine.process(CONTRACT).unwrap();
        let second = engine.process(&first.resolved_text).unwrap();
        assert_eq!(second.resolved_text, first.resolved_text);
    }

    #[test]
    fn test_runs_do_not_share_fields() {
        let engine = Engine::new(options()).unwrap();
        engine.process("---\nalpha: 1\n---\n{{alpha}}").unwrap();
        let doc = engine.process("---\nbeta: 2\n---\n{{beta}}").unwrap();
        let names: Vec<_> = doc.field_report.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["beta"]);
    }

    #[test]
    fn test_field_tracking_spans() {
        let engine = Engine::new(ProcessOptions {
            field_tracking: true,
            ..options()
        })
        .unwrap();
        let doc = engine.process("---\nname: Acme\n---\n{{name}} / {{missing}} / `{{name}}`").unwrap();
        assert_eq!(
            doc.resolved_text,
            "<span class=\"legal-field imported-value\" data-field=\"name\">Acme</span> / \
             <span class=\"legal-field missing-value\" data-field=\"missing\">{{missing}}</span> / `Acme`"
        );
        let missing = doc.field_report.fields.iter().find(|f| f.name == "missing").unwrap();
        assert_eq!(missing.status, FieldStatus::Empty);
    }

    #[test]
    fn test_extra_metadata_priority_and_filter() {
        let engine = Engine::new(options()).unwrap();
        let doc = engine
            .process_with_metadata(
                "---\nparty: Doc\n---\n{{party}} {{city}}",
                &json!({"party": "Extra", "city": "Lyon", "level-one": "X"}),
            )
            .unwrap();
        assert_eq!(doc.resolved_text, "Doc Lyon");
        assert!(doc.metadata.get("level-one").is_none());
        assert_eq!(doc.diagnostics.len(), 1);
    }

    #[test]
    fn test_process_file_resolves_imports_beside_document() {
        let reader = MemoryReader::new()
            .with_file("contracts/main.md", "---\nparty: Main\n---\nStart\n@import parts/terms.md")
            .with_file("contracts/parts/terms.md", "---\nlaw: NY\n---\n{{party}} under {{law}} law\n");
        let engine = Engine::new(options()).unwrap().with_reader(reader);
        let doc = engine.process_file(Path::new("contracts/main.md")).unwrap();
        assert_eq!(doc.resolved_text, "Start\nMain under NY law");
        assert_eq!(doc.metadata["law"], "NY");
    }

    #[test]
    fn test_missing_document_is_a_file_system_error() {
        let engine = Engine::new(options()).unwrap().with_reader(MemoryReader::new());
        assert!(matches!(
            engine.process_file(Path::new("nowhere.md")),
            Err(LegalMdError::FileSystem { .. })
        ));
    }

    #[test]
    fn test_bad_front_matter_is_a_diagnostic() {
        let engine = Engine::new(options()).unwrap();
        let doc = engine.process("---\n: [unclosed\n---\nBody").unwrap();
        assert_eq!(doc.resolved_text, "Body");
        assert_eq!(doc.diagnostics[0].stage, "frontmatter");
        assert!(doc.has_warnings());
    }

    #[test]
    fn test_unknown_stage_in_options_rejected_at_setup() {
        let result = Engine::new(ProcessOptions {
            disabled_stages: vec!["typography".to_string()],
            ..options()
        });
        assert!(matches!(result, Err(LegalMdError::Configuration(_))));
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
