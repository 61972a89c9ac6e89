use legal_md::config::ProcessOptions;
use legal_md::core::LegalMdError;
use legal_md::engine::Engine;
use legal_md::imports::MemoryReader;
use legal_md::pipeline::DiagnosticLevel;
use legal_md::test_utils::{DocumentSet, init_test_logging, test_engine, test_options};
use legal_md::tracking::FieldStatus;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::thread;

const AGREEMENT_TEXT: &str = "Article 1. Services
Section 1. Scope
The provider serves Acme Corp from January 31st, 2024.
Section 2. Fees
Acme Corp pays €1,500.00 per month.
Article 2. Disputes
Section 1. Resolution
Disputes under Section 2. are settled in Lyon by arbitration.
A deposit is due on signature.
Section 2. Confidentiality
Both parties keep this agreement confidential under France law.";

fn agreement_engine() -> Engine {
    let reader = DocumentSet::service_agreement().reader(Path::new("docs"));
    test_engine().with_reader(reader)
}

#[test]
fn test_service_agreement_end_to_end() {
    init_test_logging(None);
    let doc = agreement_engine().process_file(Path::new("docs/agreement.md")).unwrap();

    assert_eq!(doc.resolved_text, AGREEMENT_TEXT);

    let report = &doc.field_report;
    assert_eq!((report.total, report.filled, report.empty, report.logic), (6, 3, 0, 3));

    assert_eq!(doc.metadata["client"]["name"], "Acme Corp");
    assert_eq!(doc.metadata["governing-law"], "France");
    assert_eq!(doc.metadata["level-one"], "Article %n.");
    let refs = doc.metadata["_cross_references"].as_array().unwrap();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[1], json!({"key": "fees", "sectionNumber": "Section 2.", "sectionText": "Section 2. Fees"}));

    assert_eq!(doc.diagnostics.len(), 1);
    assert_eq!(doc.diagnostics[0].stage, "imports");
    assert!(doc.diagnostics[0].message.contains("level-one"));
}

#[test]
fn test_stage_metrics_cover_every_enabled_stage() {
    let doc = agreement_engine().process_file(Path::new("docs/agreement.md")).unwrap();
    let names: Vec<_> = doc.stage_metrics.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["imports", "template", "crossref", "headers", "conditions"]);
    assert!(doc.stage_metrics.failed().next().is_none());
    assert_eq!(doc.stage_metrics.get("imports").unwrap().fields_touched, 1);
}

#[test]
fn test_resolved_output_is_a_fixed_point() {
    let engine = agreement_engine();
    let first = engine.process_file(Path::new("docs/agreement.md")).unwrap();
    let second = engine.process(&first.resolved_text).unwrap();
    assert_eq!(second.resolved_text, first.resolved_text);
    assert_eq!(second.field_report.total, 0);
}

#[test]
fn test_report_total_is_sum_of_statuses() {
    let engine = test_engine();
    let docs = [
        "{{a}} {{b}}",
        "---\na: 1\n---\n{{a}} {{upper(a)}} {{missing}}",
        "---\nx: [1, 2]\n---\n{{x.0}} {{x.9}} {{x.0 > 0 ? \"yes\" : \"no\"}} {{nope(x)}}",
        "l. A |a|\nSee |a| and |b|",
    ];
    for raw in docs {
        let report = engine.process(raw).unwrap().field_report;
        assert_eq!(report.total, report.filled + report.empty + report.logic, "{raw}");
    }
}

#[test]
fn test_crossref_fields_are_always_logic() {
    let doc = test_engine()
        .process("---\nlevel-one: \"%n.\"\nparty: \"\"\n---\nl. Term |term|\nSee |term| and |party|.")
        .unwrap();
    let crossrefs: Vec<_> =
        doc.field_report.fields.iter().filter(|f| f.name.starts_with("crossref.")).collect();
    assert_eq!(crossrefs.len(), 2);
    assert!(crossrefs.iter().all(|f| f.status == FieldStatus::Logic));
}

#[test]
fn test_consecutive_documents_are_isolated() {
    let engine = test_engine();
    let a = engine.process("---\nalpha: A\n---\n{{alpha}}").unwrap();
    let b = engine.process("---\nbeta: B\n---\n{{beta}} {{alpha}}").unwrap();

    assert_eq!(a.field_report.total, 1);
    assert_eq!(b.resolved_text, "B {{alpha}}");
    let alpha = b.field_report.fields.iter().find(|f| f.name == "alpha").unwrap();
    assert_eq!(alpha.status, FieldStatus::Empty);
}

#[test]
fn test_concurrent_runs_share_one_engine() {
    let engine = Arc::new(test_engine());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let raw = format!("---\nn: {i}\nlevel-one: \"%n.\"\n---\nl. Doc {{{{n}}}}\nl. Next");
                engine.process(&raw).unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let doc = handle.join().unwrap();
        assert_eq!(doc.resolved_text, format!("1. Doc {i}\n2. Next"));
        assert_eq!(doc.field_report.total, 1);
    }
}

#[test]
fn test_disabled_stage_leaves_markup() {
    let engine = Engine::new(ProcessOptions {
        disabled_stages: vec!["headers".to_string(), "conditions".to_string()],
        ..test_options()
    })
    .unwrap();
    let doc = engine.process("---\nok: true\n---\nl. Title\n[shown]{ok}").unwrap();
    assert_eq!(doc.resolved_text, "l. Title\n[shown]{ok}");
}

#[test]
fn test_failed_expressions_are_reported_not_fatal() {
    let doc = test_engine().process("{{ upper( }} and {{ frobnicate(1) }}").unwrap();
    assert_eq!(doc.resolved_text, "{{ upper( }} and {{ frobnicate(1) }}");
    let levels: Vec<_> = doc.diagnostics.iter().map(|d| d.level).collect();
    assert_eq!(levels, [DiagnosticLevel::Warning, DiagnosticLevel::Info]);
    assert_eq!(doc.field_report.empty, 2);
}

#[test]
fn test_numeric_strings_never_equal_numbers() {
    let doc = test_engine()
        .process(
            "---\ncount: 10\ncount_text: \"10\"\namount_text: \"1,500\"\n---\n\
             [eq]{count == 10}[str]{count_text == 10}[fmt]{amount_text == 1500}\n\
             {{count_text == 10 ? \"same\" : \"different\"}}\n\
             {{#if count_text == '10'}}\nstring match\n{{/if}}",
        )
        .unwrap();
    assert_eq!(doc.resolved_text, "eq\ndifferent\nstring match");
}

#[test]
fn test_hidden_block_leaves_no_numbering_gap() {
    let raw = "---\nlevel-one: \"Article %n.\"\nshow: false\n---\nl. A\n{{#if show}}\nl. Hidden {{secret}}\n{{/if}}\nl. B";
    let doc = test_engine().process(raw).unwrap();
    assert_eq!(doc.resolved_text, "Article 1. A\nArticle 2. B");
    assert_eq!(doc.field_report.total, 0);
}

#[test]
fn test_circular_import_is_critical_only_when_it_times_out() {
    let reader = MemoryReader::new().with_file("loop.md", "Loop\n@import loop.md");
    let engine = test_engine().with_reader(reader);
    let doc = engine.process_file(Path::new("loop.md")).unwrap();
    assert_eq!(doc.resolved_text, "Loop");
    assert_eq!(doc.diagnostics.len(), 1);

    let mut options = test_options();
    options.budgets.import_ms = 0;
    let engine = Engine::new(options)
        .unwrap()
        .with_reader(MemoryReader::new().with_file("a.md", "x").with_file("main.md", "@import a.md"));
    match engine.process_file(Path::new("main.md")) {
        Err(LegalMdError::CriticalStage {
            stage,
            ..
        }) => assert_eq!(stage, "imports"),
        other => panic!("expected the imports stage to abort, got {other:?}"),
    }
}

#[test]
fn test_field_tracking_annotations() {
    let engine = Engine::new(ProcessOptions {
        field_tracking: true,
        ..test_options()
    })
    .unwrap();
    let doc = engine
        .process("---\nlevel-one: \"Art. %n\"\nname: Acme\n---\nl. Parties |parties|\n{{name}} per |parties|, {{upper(name)}}, {{city}}")
        .unwrap();
    assert_eq!(
        doc.resolved_text,
        "Art. 1 Parties\n\
         <span class=\"legal-field imported-value\" data-field=\"name\">Acme</span> per \
         <span class=\"legal-field highlight\" data-field=\"crossref.parties\">Art. 1</span>, \
         <span class=\"legal-field highlight\" data-field=\"upper(name)\">ACME</span>, \
         <span class=\"legal-field missing-value\" data-field=\"city\">{{city}}</span>"
    );
}
