use legal_md::test_utils::test_engine;

fn resolve(raw: &str) -> String {
    test_engine().process(raw).unwrap().resolved_text
}

#[test]
fn test_counters_reset_when_a_higher_level_advances() {
    let text = resolve(
        "---\nlevel-one: \"Article %n.\"\nlevel-two: \"Section %n.\"\n---\nl. A\nll. B\nll. C\nl. D\nll. E",
    );
    assert_eq!(text, "Article 1. A\nSection 1. B\nSection 2. C\nArticle 2. D\nSection 1. E");
}

#[test]
fn test_consecutive_same_level_headers() {
    let text = resolve("---\nlevel-one: \"%R.\"\n---\nl. One\nl. Two\nl. Three\nl. Four");
    assert_eq!(text, "I. One\nII. Two\nIII. Three\nIV. Four");
}

#[test]
fn test_dotted_and_padded_formats() {
    let text = resolve(
        "---\nlevel-one: \"%l1.\"\nlevel-two: \"%l1.%l2\"\nlevel-three: \"%l1.%l2.%03n\"\n---\nl. A\nll. B\nlll. C\nlll. D\nll. E",
    );
    assert_eq!(text, "1. A\n1.1 B\n1.1.001 C\n1.1.002 D\n1.2 E");
}

#[test]
fn test_skipped_levels_start_at_zero() {
    let text = resolve("---\nlevel-one: \"%n\"\nlevel-three: \"%l1.%l2.%l3\"\n---\nlll. Deep\nl. Top");
    assert_eq!(text, "0.0.1 Deep\n1 Top");
}

#[test]
fn test_alphabetic_levels_and_numeric_aliases() {
    let text = resolve("---\nlevel-one: \"(%a)\"\nlevel-two: \"(%A)\"\n---\nl1. x\nl2. y\nl2. z\nl. w");
    assert_eq!(text, "(a) x\n(A) y\n(B) z\n(b) w");
}

#[test]
fn test_unconfigured_level_placeholder() {
    assert_eq!(resolve("l. Only"), "{{undefined-level-1}} Only");
}

#[test]
fn test_indentation_from_metadata() {
    let text = resolve("---\nlevel-one: \"%n.\"\nlevel-two: \"%n)\"\nlevel-indent: 1\n---\nl. A\nll. B");
    assert_eq!(text, "1. A\n  1) B");
}

#[test]
fn test_forward_and_backward_references() {
    let text = resolve(
        "---\nlevel-one: \"Art. %n\"\n---\nSee |law| first.\nl. Definitions |defs|\nl. Governing law |law|\nTerms are in |defs|.",
    );
    assert_eq!(text, "See Art. 2 first.\nArt. 1 Definitions\nArt. 2 Governing law\nTerms are in Art. 1.");
}

#[test]
fn test_duplicate_reference_key_later_wins() {
    let doc = test_engine()
        .process("---\nlevel-one: \"%n.\"\n---\nl. First |k|\nl. Second |k|\nSee |k|.")
        .unwrap();
    assert_eq!(doc.resolved_text, "1. First\n2. Second\nSee 2..");
    assert_eq!(doc.diagnostics.len(), 1);
    assert_eq!(doc.diagnostics[0].stage, "crossref");
}

#[test]
fn test_reference_falls_back_to_metadata() {
    let text = resolve("---\ncourt:\n  city: Paris\n---\nVenue: |court.city|, unknown: |nothing|.");
    assert_eq!(text, "Venue: Paris, unknown: |nothing|.");
}

#[test]
fn test_code_fences_are_untouched() {
    let text = resolve("---\nname: Acme\nlevel-one: \"%n.\"\n---\n```\nl. not a header {{name}}\n```\nl. Real {{name}}");
    assert_eq!(text, "```\nl. not a header {{name}}\n```\n1. Real Acme");
}

#[test]
fn test_oversized_padding_keeps_numbering_and_references() {
    let doc = test_engine()
        .process("---\nlevel-one: \"Art %070000n\"\nlevel-two: \"%02n.\"\n---\nl. Definitions\nll. Payment |pay|\nSee |pay|.")
        .unwrap();
    assert_eq!(doc.resolved_text, "Art %070000n Definitions\n01. Payment\nSee 01..");
    assert!(doc.stage_metrics.failed().next().is_none());
    assert!(doc.diagnostics.is_empty());
}

#[test]
fn test_extreme_level_indent_is_clamped() {
    let doc = test_engine()
        .process("---\nlevel-one: \"%n.\"\nlevel-two: \"%n.\"\nlevel-indent: 1.0e18\n---\nl. Top\nll. Nested")
        .unwrap();
    assert_eq!(doc.resolved_text, format!("1. Top\n{}1. Nested", " ".repeat(16)));
    assert!(doc.stage_metrics.failed().next().is_none());

    let text = resolve("---\nlevel-two: \"%n.\"\nlevel-indent: \"-4\"\n---\nll. Flat");
    assert_eq!(text, "1. Flat");
}

#[test]
fn test_hidden_block_headers_take_no_number() {
    let doc = test_engine()
        .process("---\nlevel-one: \"Article %n.\"\nshow: false\n---\nl. A\n{{#if show}}\nl. Hidden |hidden|\n{{/if}}\nl. B |b|\nSee |b|.")
        .unwrap();
    assert_eq!(doc.resolved_text, "Article 1. A\nArticle 2. B\nSee Article 2..");
    let refs = doc.metadata["_cross_references"].as_array().unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0]["key"], "b");
}
