//! Document fixtures for tests.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::imports::MemoryReader;

/// One document at a path relative to a fixture root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFixture {
    pub path: String,
    pub content: String,
}

impl DocumentFixture {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Service agreement exercising every stage: expressions, numbered headers with a
    /// cross-reference, an inline clause, a block clause and one import.
    pub fn service_agreement() -> Self {
        Self::new(
            "agreement.md",
            r#"---
client:
  name: Acme Corp
  city: Lyon
fee: 1500
arbitration: true
start: 2024-01-31
level-one: "Article %n."
level-two: "Section %n."
---
l. Services
ll. Scope |scope|
The provider serves {{client.name}} from {{formatDate(start, "MMMM Do, YYYY")}}.
ll. Fees |fees|
{{client.name}} pays {{formatCurrency(fee, "EUR")}} per month.
l. Disputes
ll. Resolution
Disputes under |fees| are settled in {{client.city}}[ by arbitration]{arbitration}.
{{#if fee > 1000}}
A deposit is due on signature.
{{else}}
No deposit is due.
{{/if}}
@import clauses/confidentiality.md"#,
        )
    }

    /// Clause imported by [`service_agreement`](Self::service_agreement).
    pub fn confidentiality_clause() -> Self {
        Self::new(
            "clauses/confidentiality.md",
            r#"---
governing-law: France
client:
  name: Ignored Inc
level-one: "Chapter %R"
---
ll. Confidentiality
Both parties keep this agreement confidential under {{governing-law}} law.
"#,
        )
    }

    /// Write this fixture below `root`, creating parent directories.
    pub fn write_to(&self, root: &Path) -> Result<PathBuf> {
        let path = root.join(&self.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, &self.content)
            .with_context(|| format!("Failed to write fixture {}", path.display()))?;
        Ok(path)
    }
}

/// Fixtures that belong together, e.g. a document and the files it imports.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    pub documents: Vec<DocumentFixture>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The service agreement and its imported clause.
    pub fn service_agreement() -> Self {
        Self::new()
            .with(DocumentFixture::service_agreement())
            .with(DocumentFixture::confidentiality_clause())
    }

    pub fn with(mut self, document: DocumentFixture) -> Self {
        self.documents.push(document);
        self
    }

    /// Write every fixture below `root`.
    pub fn write_to(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.documents.iter().map(|d| d.write_to(root)).collect()
    }

    /// In-memory reader serving every fixture below `root`.
    pub fn reader(&self, root: &Path) -> MemoryReader {
        self.documents.iter().fold(MemoryReader::new(), |reader, d| {
            reader.with_file(root.join(&d.path), d.content.clone())
        })
    }
}
