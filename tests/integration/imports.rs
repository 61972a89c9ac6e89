use legal_md::config::ProcessOptions;
use legal_md::engine::Engine;
use legal_md::test_utils::{DocumentFixture, DocumentSet, test_engine, test_options};
use serde_json::json;
use tempfile::TempDir;

fn write(set: &DocumentSet) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    set.write_to(dir.path()).unwrap();
    dir
}

#[test]
fn test_imports_from_disk_relative_to_each_file() {
    let dir = write(
        &DocumentSet::new()
            .with(DocumentFixture::new("main.md", "---\nparty: Main\n---\nBegin\n@import parts/a.md\nEnd"))
            .with(DocumentFixture::new("parts/a.md", "---\nlaw: FR\n---\nA for {{party}}\n@import nested/b.md\n"))
            .with(DocumentFixture::new("parts/nested/b.md", "B under {{law}}\n")),
    );

    let doc = test_engine().process_file(&dir.path().join("main.md")).unwrap();
    assert_eq!(doc.resolved_text, "Begin\nA for Main\nB under FR\nEnd");
}

#[test]
fn test_document_wins_over_every_import_in_order() {
    let dir = write(
        &DocumentSet::new()
            .with(DocumentFixture::new(
                "main.md",
                "---\nterms:\n  days: 30\n---\n@import first.md\n@import second.md\n{{terms.days}} {{terms.rate}} {{terms.currency}}",
            ))
            .with(DocumentFixture::new("first.md", "---\nterms:\n  days: 60\n  rate: 5\n---\n"))
            .with(DocumentFixture::new(
                "second.md",
                "---\nterms:\n  rate: 9\n  currency: EUR\n---\n",
            )),
    );

    let doc = test_engine().process_file(&dir.path().join("main.md")).unwrap();
    assert_eq!(doc.resolved_text, "\n\n30 5 EUR");
    assert_eq!(doc.metadata["terms"], json!({"days": 30, "rate": 5, "currency": "EUR"}));
}

#[test]
fn test_reserved_keys_never_come_from_imports() {
    let dir = write(
        &DocumentSet::new()
            .with(DocumentFixture::new("main.md", "@import evil.md\nl. Title"))
            .with(DocumentFixture::new(
                "evil.md",
                "---\nlevel-one: \"HIJACKED %n\"\n_cross_references: [1]\nmeta-json-output: /tmp/x.json\nfine: yes\n---\n",
            )),
    );

    let doc = test_engine().process_file(&dir.path().join("main.md")).unwrap();
    assert_eq!(doc.resolved_text, "\n{{undefined-level-1}} Title");
    assert!(doc.metadata.get("level-one").is_none());
    assert!(doc.metadata.get("meta-json-output").is_none());
    assert_eq!(doc.metadata["_cross_references"], json!([]));
    assert_eq!(doc.metadata["fine"], "yes");
    assert_eq!(doc.diagnostics.len(), 3);
}

#[test]
fn test_type_conflicts_reported_when_enabled() {
    let dir = write(
        &DocumentSet::new()
            .with(DocumentFixture::new("main.md", "---\nfee: 100\n---\n@import a.md\n{{fee}}"))
            .with(DocumentFixture::new("a.md", "---\nfee: a lot\n---\n")),
    );
    let engine = Engine::new(ProcessOptions {
        validate_merge_types: true,
        ..test_options()
    })
    .unwrap();

    let doc = engine.process_file(&dir.path().join("main.md")).unwrap();
    assert_eq!(doc.resolved_text, "\n100");
    assert_eq!(doc.diagnostics.len(), 1);
    assert!(doc.diagnostics[0].message.contains("fee"));
}

#[test]
fn test_import_tracing_comments() {
    let dir = write(
        &DocumentSet::new()
            .with(DocumentFixture::new("main.md", "@import clause.md"))
            .with(DocumentFixture::new("clause.md", "Clause text")),
    );
    let engine = Engine::new(ProcessOptions {
        import_tracing: true,
        ..test_options()
    })
    .unwrap();

    let doc = engine.process_file(&dir.path().join("main.md")).unwrap();
    let lines: Vec<_> = doc.resolved_text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("<!-- start import: "));
    assert_eq!(lines[1], "Clause text");
    assert!(lines[2].starts_with("<!-- end import: "));
}

#[test]
fn test_base_path_option() {
    let dir = write(&DocumentSet::new().with(DocumentFixture::new("lib/nda.md", "NDA")));
    let engine = Engine::new(ProcessOptions {
        base_path: Some(dir.path().join("lib")),
        ..test_options()
    })
    .unwrap();
    let doc = engine.process("Start\n@import nda.md").unwrap();
    assert_eq!(doc.resolved_text, "Start\nNDA");
}

#[test]
fn test_missing_import_is_left_in_place() {
    let dir = write(&DocumentSet::new().with(DocumentFixture::new("main.md", "@import gone.md")));
    let doc = test_engine().process_file(&dir.path().join("main.md")).unwrap();
    assert_eq!(doc.resolved_text, "@import gone.md");
    assert!(doc.diagnostics[0].message.contains("Cannot read import"));
}
