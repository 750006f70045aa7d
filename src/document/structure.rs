use serde::{Deserialize, Serialize};

use super::bibliography::{extract_bibliography, part_titles, remove_bibliography, split_bibliography};
use super::scanner::{extract_abstract, extract_authors, find_markers};

/// Depth of a node in the section tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionLevel {
    Section,
    Subsection,
    Subsubsection,
}

impl SectionLevel {
    /// LaTeX command that opens a node at this level.
    pub fn command(self) -> &'static str {
        match self {
            SectionLevel::Section => "section",
            SectionLevel::Subsection => "subsection",
            SectionLevel::Subsubsection => "subsubsection",
        }
    }

    pub fn depth(self) -> usize {
        match self {
            SectionLevel::Section => 0,
            SectionLevel::Subsection => 1,
            SectionLevel::Subsubsection => 2,
        }
    }

    fn child(self) -> Option<SectionLevel> {
        match self {
            SectionLevel::Section => Some(SectionLevel::Subsection),
            SectionLevel::Subsection => Some(SectionLevel::Subsubsection),
            SectionLevel::Subsubsection => None,
        }
    }
}

/// One titled node. `content` holds only the text not owned by `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionNode {
    pub title: String,
    pub level: SectionLevel,
    pub content: String,
    pub children: Vec<SectionNode>,
}

impl SectionNode {
    /// A top-level node without children, used for Abstract, Authors and
    /// bibliography parts.
    pub fn leaf(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            level: SectionLevel::Section,
            content: content.into(),
            children: Vec::new(),
        }
    }
}

/// Top-level nodes in their fixed order: Abstract, Authors, document
/// sections, bibliography parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTree {
    pub nodes: Vec<SectionNode>,
}

/// Builds the section tree from assembled LaTeX.
///
/// The bibliography is pulled out first and split into parts of at most
/// `bib_max_bytes`; the remaining text is scanned for sections.
pub fn build_section_tree(latex: &str, bib_max_bytes: usize) -> SectionTree {
    let bibliography = extract_bibliography(latex);
    let bib_parts = split_bibliography(&bibliography, bib_max_bytes);
    let latex = remove_bibliography(latex);

    let mut nodes = Vec::new();

    let abstract_text = extract_abstract(&latex);
    if !abstract_text.is_empty() {
        nodes.push(SectionNode::leaf("Abstract", abstract_text));
    }
    let authors = extract_authors(&latex);
    if !authors.is_empty() {
        nodes.push(SectionNode::leaf("Authors", authors));
    }

    nodes.extend(extract_section_structure(&latex));

    let titles = part_titles(bib_parts.len());
    nodes.extend(
        titles
            .into_iter()
            .zip(bib_parts)
            .map(|(title, part)| SectionNode::leaf(title, part)),
    );

    SectionTree { nodes }
}

/// Sections, subsections and subsubsections of `latex` in source order.
///
/// Text before the first `\section` is not part of any node.
pub fn extract_section_structure(latex: &str) -> Vec<SectionNode> {
    split_level(latex, SectionLevel::Section).1
}

/// Splits `span` at the markers of `level`.
///
/// Returns the text before the first marker (owned by the parent) and one
/// node per marker whose span runs to the next marker or the end of `span`.
fn split_level(span: &str, level: SectionLevel) -> (String, Vec<SectionNode>) {
    let markers = find_markers(span, level.command());
    let Some(first) = markers.first() else {
        return (span.to_string(), Vec::new());
    };

    let leading = span[..first.start].to_string();
    let nodes = markers
        .iter()
        .enumerate()
        .map(|(i, marker)| {
            let end = markers.get(i + 1).map(|next| next.start).unwrap_or(span.len());
            let node_span = &span[marker.start..end];
            let (content, children) = match level.child() {
                Some(child) => split_level(node_span, child),
                None => (node_span.to_string(), Vec::new()),
            };
            SectionNode {
                title: marker.title.clone(),
                level,
                content,
                children,
            }
        })
        .collect();

    (leading, nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = r"\documentclass{article}
\title{A Paper}
\author{Ada \and Bob}
\begin{document}
\begin{abstract}
Short.
\end{abstract}
\section{Introduction}
Intro text.
\subsection{Motivation}
Why.
\subsubsection{History}
Old.
\subsubsection{Today}
New.
\subsection{Plan}
How.
\section{Methods and Materials}
M.
\begin{thebibliography}{9}
\bibitem{a} A.
\bibitem{b} B.
\end{thebibliography}
\end{document}
";

    fn titles(nodes: &[SectionNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn top_level_order_is_fixed() {
        let tree = build_section_tree(PAPER, 10_000);
        assert_eq!(
            titles(&tree.nodes),
            vec!["Abstract", "Authors", "Introduction", "Methods and Materials", "Bibliography"]
        );
        assert_eq!(tree.nodes[1].content, r"\author{Ada \and Bob}");
    }

    #[test]
    fn content_is_partitioned_between_levels() {
        let tree = build_section_tree(PAPER, 10_000);
        let intro = &tree.nodes[2];
        assert_eq!(intro.content, "\\section{Introduction}\nIntro text.\n");
        assert_eq!(titles(&intro.children), vec!["Motivation", "Plan"]);

        let motivation = &intro.children[0];
        assert_eq!(motivation.level, SectionLevel::Subsection);
        assert_eq!(motivation.content, "\\subsection{Motivation}\nWhy.\n");
        assert_eq!(titles(&motivation.children), vec!["History", "Today"]);
        assert_eq!(motivation.children[1].content, "\\subsubsection{Today}\nNew.\n");
        assert_eq!(intro.children[1].content, "\\subsection{Plan}\nHow.\n");
    }

    #[test]
    fn bibliography_is_not_section_content() {
        let tree = build_section_tree(PAPER, 10_000);
        let methods = &tree.nodes[3];
        assert_eq!(methods.content, "\\section{Methods and Materials}\nM.\n\n\\end{document}\n");
        assert!(tree.nodes[4].content.starts_with("\\bibitem{a} A.\n"));
    }

    #[test]
    fn small_budget_numbers_bibliography_parts() {
        let tree = build_section_tree(PAPER, 16);
        let bib: Vec<_> = titles(&tree.nodes).into_iter().filter(|t| t.starts_with("Bib")).collect();
        assert_eq!(bib, vec!["Bibliography_1", "Bibliography_2"]);
    }

    #[test]
    fn document_without_sections_degrades_gracefully() {
        let tree = build_section_tree("\\begin{abstract}Only.\\end{abstract}", 10_000);
        assert_eq!(titles(&tree.nodes), vec!["Abstract"]);
        assert!(build_section_tree("plain text", 10_000).nodes.is_empty());
    }

    #[test]
    fn duplicate_titles_stay_distinct() {
        let nodes = extract_section_structure("\\section{A}x\\section{A}y");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].content, "\\section{A}y");
    }
}
