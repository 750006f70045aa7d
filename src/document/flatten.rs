use serde::{Deserialize, Serialize};

use super::structure::{SectionNode, SectionTree};

/// One retrievable unit of text tagged with its section path.
///
/// Empty strings mark levels that do not apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub section: String,
    pub subsection: String,
    pub subsubsection: String,
    pub content: String,
}

impl ChunkRecord {
    pub fn path(&self) -> [&str; 3] {
        [&self.section, &self.subsection, &self.subsubsection]
    }

    /// Most specific title: the last non-empty of section, subsection and
    /// subsubsection, scanned in that order.
    pub fn title(&self) -> &str {
        let mut title = "";
        for name in self.path() {
            if !name.is_empty() {
                title = name;
            }
        }
        title
    }
}

/// Depth-first projection of the tree, one record per node with non-empty
/// own content.
pub fn flatten(tree: &SectionTree) -> Vec<ChunkRecord> {
    let mut records = Vec::new();
    let mut path: Vec<&str> = Vec::with_capacity(3);
    for node in &tree.nodes {
        visit(node, &mut path, &mut records);
    }
    records
}

fn visit<'a>(node: &'a SectionNode, path: &mut Vec<&'a str>, records: &mut Vec<ChunkRecord>) {
    path.push(&node.title);
    if !node.content.is_empty() {
        let name = |depth: usize| path.get(depth).map(|s| s.to_string()).unwrap_or_default();
        records.push(ChunkRecord {
            section: name(0),
            subsection: name(1),
            subsubsection: name(2),
            content: node.content.clone(),
        });
    }
    for child in &node.children {
        visit(child, path, records);
    }
    path.pop();
}

/// Markdown table of contents, two spaces of indent per level.
pub fn table_of_contents(tree: &SectionTree) -> String {
    let mut lines = Vec::new();
    for node in &tree.nodes {
        toc_lines(node, &mut lines);
    }
    lines.join("\n")
}

fn toc_lines(node: &SectionNode, lines: &mut Vec<String>) {
    lines.push(format!("{}- {}", "  ".repeat(node.level.depth()), node.title));
    for child in &node.children {
        toc_lines(child, lines);
    }
}
