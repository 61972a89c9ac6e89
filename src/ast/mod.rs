//! Document AST for Legal Markdown bodies.
//!
//! The body of a document is split into a tree of [`Node`]s. The root is a
//! [`NodeKind::Container`]; each body line becomes a [`NodeKind::Text`] leaf and each fenced
//! code block becomes a single [`NodeKind::Verbatim`] leaf that no stage rewrites. The import
//! stage replaces an `@import` line with a container holding the imported body, so the tree
//! depth follows the import structure.
//!
//! Rendering joins leaves with `\n`, which makes `parse_body(text).render() == text` for every
//! input, including trailing newlines.

use std::path::PathBuf;

/// Kind of an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A single line of markup that stages may rewrite.
    Text,
    /// A fenced code block (possibly several lines) that stages must leave untouched.
    Verbatim,
    /// An ordered group of children, e.g. the document root or an imported file.
    Container,
}

/// Where a node came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSpan {
    /// First line (1-based) in the originating file.
    pub start_line: usize,
    /// Last line (1-based, inclusive).
    pub end_line: usize,
    /// Originating file for imported content; `None` for the main document.
    pub file: Option<PathBuf>,
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// Leaf text; empty for containers.
    pub raw_text: String,
    pub children: Vec<Node>,
    pub span: SourceSpan,
}

impl Node {
    pub fn text(raw_text: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind: NodeKind::Text,
            raw_text: raw_text.into(),
            children: Vec::new(),
            span,
        }
    }

    pub fn verbatim(raw_text: impl Into<String>, span: SourceSpan) -> Self {
        Self {
            kind: NodeKind::Verbatim,
            raw_text: raw_text.into(),
            children: Vec::new(),
            span,
        }
    }

    pub fn container(children: Vec<Node>, span: SourceSpan) -> Self {
        Self {
            kind: NodeKind::Container,
            raw_text: String::new(),
            children,
            span,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind != NodeKind::Container
    }

    /// Render the subtree back to text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut first = true;
        self.render_into(&mut out, &mut first);
        out
    }

    fn render_into(&self, out: &mut String, first: &mut bool) {
        if self.is_leaf() {
            if !*first {
                out.push('\n');
            }
            *first = false;
            out.push_str(&self.raw_text);
        } else {
            for child in &self.children {
                child.render_into(out, first);
            }
        }
    }

    /// Total number of bytes held by leaves, used for stage metrics.
    pub fn text_size(&self) -> usize {
        if self.is_leaf() {
            self.raw_text.len()
        } else {
            self.children.iter().map(Node::text_size).sum()
        }
    }

    /// All leaves (text and verbatim) in document order.
    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    /// Mutable access to all leaves in document order.
    pub fn leaves_mut(&mut self) -> Vec<&mut Node> {
        let mut out = Vec::new();
        collect_leaves_mut(self, &mut out);
        out
    }

    /// Mutable access to rewritable text leaves in document order.
    pub fn text_leaves_mut(&mut self) -> Vec<&mut Node> {
        self.leaves_mut().into_iter().filter(|n| n.kind == NodeKind::Text).collect()
    }

    /// Drop leaves for which `keep` returns false. Containers are kept even when emptied.
    pub fn retain_leaves(&mut self, mut keep: impl FnMut(&Node) -> bool) {
        retain_rec(self, &mut keep);
    }
}

fn collect_leaves<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
    if node.is_leaf() {
        out.push(node);
    } else {
        for child in &node.children {
            collect_leaves(child, out);
        }
    }
}

fn collect_leaves_mut<'a>(node: &'a mut Node, out: &mut Vec<&'a mut Node>) {
    if node.is_leaf() {
        out.push(node);
    } else {
        for child in &mut node.children {
            collect_leaves_mut(child, out);
        }
    }
}

fn retain_rec(node: &mut Node, keep: &mut dyn FnMut(&Node) -> bool) {
    node.children.retain_mut(|child| {
        if child.is_leaf() {
            keep(child)
        } else {
            retain_rec(child, keep);
            true
        }
    });
}

/// Returns the fence marker (```` ``` ```` or `~~~`) if the line opens or closes a fence.
fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// Parse a document body into a tree rooted at a container.
///
/// `file` is recorded in every span so diagnostics can name the imported file.
pub fn parse_body(body: &str, file: Option<PathBuf>) -> Node {
    let mut children = Vec::new();
    let mut fence: Option<(&'static str, usize, String)> = None;

    for (idx, line) in body.split('\n').enumerate() {
        let line_no = idx + 1;
        match fence.take() {
            Some((marker, start, mut block)) => {
                block.push('\n');
                block.push_str(line);
                if line.trim_start().starts_with(marker) {
                    children.push(Node::verbatim(
                        block,
                        SourceSpan {
                            start_line: start,
                            end_line: line_no,
                            file: file.clone(),
                        },
                    ));
                } else {
                    fence = Some((marker, start, block));
                }
            }
            None => {
                if let Some(marker) = fence_marker(line) {
                    fence = Some((marker, line_no, line.to_string()));
                } else {
                    children.push(Node::text(
                        line,
                        SourceSpan {
                            start_line: line_no,
                            end_line: line_no,
                            file: file.clone(),
                        },
                    ));
                }
            }
        }
    }

    // An unclosed fence runs to the end of the body.
    if let Some((_, start, block)) = fence {
        let end_line = start + block.matches('\n').count();
        children.push(Node::verbatim(
            block,
            SourceSpan {
                start_line: start,
                end_line,
                file: file.clone(),
            },
        ));
    }

    let end_line = children.last().map_or(0, |c| c.span.end_line);
    Node::container(
        children,
        SourceSpan {
            start_line: 1,
            end_line,
            file,
        },
    )
}
