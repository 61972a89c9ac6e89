//! The canonical stages, in the order they run:
//!
//! 1. `imports`: splice `@import` files in and merge their front matter
//! 2. `template`: apply `{{#if}}` blocks, then resolve `{{ ... }}` expressions
//! 3. `crossref`: collect `|key|` definitions and substitute references
//! 4. `headers`: number `l.` / `ll.` headers
//! 5. `conditions`: apply inline `[text]{cond}` clauses (and any blocks still present)
//! 6. `annotation`: turn field markers into `<span>` annotations (field tracking only)

use anyhow::Result;
use tracing::{debug, warn};

use super::DiagnosticLevel;
use super::stage::{Stage, StageContext};
use crate::ast::Node;
use crate::conditions::{apply_blocks, apply_conditions};
use crate::config::ProcessOptions;
use crate::crossref::CrossReferences;
use crate::expression::{
    EvalContext, Expr, ExpressionError, Resolved, display_value, parse, evaluate, scan_mixins,
};
use crate::frontmatter::merge_sequence;
use crate::headers::{HeaderFormats, HeaderNumberer, parse_header_line};
use crate::imports::{ImportError, ImportExpander};
use crate::tracking::{FieldRegistry, annotate, mark};

/// Every canonical stage, boxed for registration.
pub fn canonical_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ImportsStage),
        Box::new(TemplateStage),
        Box::new(CrossReferenceStage),
        Box::new(HeadersStage),
        Box::new(ConditionsStage),
        Box::new(AnnotationStage),
    ]
}

pub struct ImportsStage;

impl Stage for ImportsStage {
    fn name(&self) -> &'static str {
        "imports"
    }

    fn order(&self) -> u32 {
        10
    }

    fn run(&self, root: &mut Node, ctx: &mut StageContext<'_>) -> Result<usize> {
        let base_dir = ctx.base_dir();
        let expansion = ImportExpander::new(ctx.reader, ctx.parser)
            .with_tracing(ctx.options.import_tracing)
            .with_budget(ctx.options.budgets.import())
            .expand(root, &base_dir, ctx.source_path.as_deref())?;

        for warning in &expansion.warnings {
            ctx.diagnose(self.name(), DiagnosticLevel::Warning, warning.clone());
        }
        if expansion.metadata.is_empty() {
            return Ok(0);
        }

        let merged =
            merge_sequence(&ctx.metadata, &expansion.metadata, &ctx.options.merge_options())
                .map_err(ImportError::from)?;

        for key in &merged.filtered {
            let message = format!("Imported metadata may not set reserved key '{key}'; ignored");
            warn!("{message}");
            ctx.diagnose(self.name(), DiagnosticLevel::Warning, message);
        }
        for conflict in &merged.type_conflicts {
            ctx.diagnose(
                self.name(),
                DiagnosticLevel::Warning,
                format!(
                    "Imported '{}' is a {} but the document has a {}; document value kept",
                    conflict.key, conflict.imported_type, conflict.current_type
                ),
            );
        }
        if !merged.conflicts.is_empty() {
            debug!("Document metadata kept over imports for: {}", merged.conflicts.join(", "));
        }

        ctx.metadata = merged.merged;
        Ok(expansion.imported_files.len())
    }
}

pub struct TemplateStage;

impl Stage for TemplateStage {
    fn name(&self) -> &'static str {
        "template"
    }

    fn order(&self) -> u32 {
        20
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["imports"]
    }

    fn run(&self, root: &mut Node, ctx: &mut StageContext<'_>) -> Result<usize> {
        let annotate = ctx.options.field_tracking;
        let eval = EvalContext::new(&ctx.metadata, ctx.helpers).with_today(ctx.today);
        let mut issues = Vec::new();

        let blocks = apply_blocks(root, &eval);
        issues.extend(blocks.warnings.into_iter().map(|w| (DiagnosticLevel::Warning, w)));
        if blocks.removed_lines > 0 {
            debug!("Conditional blocks removed {} line(s)", blocks.removed_lines);
        }
        let mut touched = blocks.inline_resolved;

        for leaf in root.text_leaves_mut() {
            let resolved =
                resolve_mixins(&leaf.raw_text, &eval, &mut ctx.registry, annotate, &mut issues);
            if let Some((text, count)) = resolved {
                leaf.raw_text = text;
                touched += count;
            }
        }

        for (level, message) in issues {
            ctx.diagnose(self.name(), level, message);
        }
        Ok(touched)
    }
}

/// Resolve every `{{ ... }}` in one line. `None` when the line has no expressions.
fn resolve_mixins(
    line: &str,
    eval: &EvalContext<'_>,
    registry: &mut FieldRegistry,
    annotate: bool,
    issues: &mut Vec<(DiagnosticLevel, String)>,
) -> Option<(String, usize)> {
    let spans: Vec<_> = scan_mixins(line).into_iter().filter(|s| !s.is_block_marker()).collect();
    if spans.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    for span in &spans {
        out.push_str(&line[cursor..span.range.start]);
        cursor = span.range.end;
        let original = &line[span.range.clone()];

        let outcome = parse(&span.inner).and_then(|expr| {
            let value = evaluate(&expr, eval)?;
            Ok((expr, value))
        });

        let (field, text) = match outcome {
            Ok((expr, value @ Resolved::Value(_))) => {
                let field = field_name(&expr, &span.inner);
                registry.track(&field, &value, original, expr.has_logic());
                let text = value.as_value().map(display_value).unwrap_or_default();
                (field, text)
            }
            Ok((expr, Resolved::Empty)) => {
                let field = field_name(&expr, &span.inner);
                registry.track(&field, &Resolved::Empty, original, expr.has_logic());
                (field, original.to_string())
            }
            Err(err) => {
                match &err {
                    ExpressionError::UnknownHelper {
                        ..
                    } => {
                        debug!("Leaving '{original}' unresolved: {err}");
                        issues.push((DiagnosticLevel::Info, format!("'{original}': {err}")));
                    }
                    _ => {
                        warn!("Leaving '{original}' unresolved: {err}");
                        issues.push((DiagnosticLevel::Warning, format!("'{original}': {err}")));
                    }
                }
                registry.track(&span.inner, &Resolved::Empty, original, false);
                (span.inner.clone(), original.to_string())
            }
        };

        if annotate {
            out.push_str(&mark(&field, &text));
        } else {
            out.push_str(&text);
        }
    }
    out.push_str(&line[cursor..]);
    Some((out, spans.len()))
}

fn field_name(expr: &Expr, inner: &str) -> String {
    match expr {
        Expr::Path(path) => path.to_string(),
        _ => inner.to_string(),
    }
}

pub struct CrossReferenceStage;

impl Stage for CrossReferenceStage {
    fn name(&self) -> &'static str {
        "crossref"
    }

    fn order(&self) -> u32 {
        30
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["template"]
    }

    fn run(&self, root: &mut Node, ctx: &mut StageContext<'_>) -> Result<usize> {
        let (refs, warnings) = CrossReferences::collect(root, &ctx.metadata);
        for warning in warnings {
            ctx.diagnose(self.name(), DiagnosticLevel::Warning, warning);
        }
        let count =
            refs.substitute(root, &ctx.metadata, &mut ctx.registry, ctx.options.field_tracking);
        refs.publish(&mut ctx.metadata);
        Ok(count)
    }
}

pub struct HeadersStage;

impl Stage for HeadersStage {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn order(&self) -> u32 {
        40
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["template"]
    }

    fn run(&self, root: &mut Node, ctx: &mut StageContext<'_>) -> Result<usize> {
        let mut numberer = HeaderNumberer::new(HeaderFormats::from_metadata(&ctx.metadata));
        let mut headers = 0;
        for leaf in root.text_leaves_mut() {
            if let Some(header) = parse_header_line(&leaf.raw_text) {
                leaf.raw_text = numberer.render(&header);
                headers += 1;
            }
        }
        Ok(headers)
    }
}

pub struct ConditionsStage;

impl Stage for ConditionsStage {
    fn name(&self) -> &'static str {
        "conditions"
    }

    fn order(&self) -> u32 {
        50
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["template"]
    }

    fn run(&self, root: &mut Node, ctx: &mut StageContext<'_>) -> Result<usize> {
        let outcome = apply_conditions(root, &ctx.eval_context());
        for warning in outcome.warnings {
            ctx.diagnose(self.name(), DiagnosticLevel::Warning, warning);
        }
        debug!(
            "Conditions resolved {} inline clause(s) and removed {} line(s)",
            outcome.inline_resolved, outcome.removed_lines
        );
        Ok(outcome.inline_resolved)
    }
}

pub struct AnnotationStage;

impl Stage for AnnotationStage {
    fn name(&self) -> &'static str {
        "annotation"
    }

    fn order(&self) -> u32 {
        60
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["template", "crossref"]
    }

    fn is_enabled(&self, options: &ProcessOptions) -> bool {
        options.field_tracking && !options.is_stage_disabled(self.name())
    }

    fn run(&self, root: &mut Node, ctx: &mut StageContext<'_>) -> Result<usize> {
        for leaf in root.text_leaves_mut() {
            leaf.raw_text = annotate(&leaf.raw_text, &ctx.registry);
        }
        Ok(ctx.registry.len())
    }
}
