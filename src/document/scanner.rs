use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ABSTRACT_PATTERN: Regex =
        Regex::new(r"(?s)\\begin\{abstract\}(.*?)\\end\{abstract\}").unwrap();
    static ref NEWCOMMAND_PATTERN: Regex = Regex::new(r"(?m)^\\newcommand.*$").unwrap();
}

/// A sectioning command found in the text, e.g. `\subsection*{Setup}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Byte offset of the leading backslash.
    pub start: usize,
    pub title: String,
}

/// Returns the byte offset of the brace closing the one at `open`.
///
/// Depth is counted explicitly so titles such as `{The $\mathbb{R}$ case}`
/// close on the right brace. Backslash-escaped braces are not counted.
pub fn find_matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut escaped = false;
    for (pos, &byte) in bytes.iter().enumerate().skip(open) {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

/// Finds every `\<command>{...}` / `\<command>*{...}` in document order.
///
/// The command must be followed directly by `*` or `{`, so `\section` never
/// matches `\sectionmark`. Markers whose title brace never closes are skipped.
pub fn find_markers(text: &str, command: &str) -> Vec<Marker> {
    let needle = format!("\\{}", command);
    let mut markers = Vec::new();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find(&needle) {
        let start = cursor + found;
        let mut open = start + needle.len();
        if text[open..].starts_with('*') {
            open += 1;
        }
        cursor = start + needle.len();

        if !text[open..].starts_with('{') {
            continue;
        }
        if let Some(close) = find_matching_brace(text, open) {
            markers.push(Marker {
                start,
                title: text[open + 1..close].to_string(),
            });
            cursor = close + 1;
        }
    }

    markers
}

/// Body of the first `\<command>{...}`, or `None` when absent or unterminated.
fn first_argument<'a>(text: &'a str, command: &str) -> Option<&'a str> {
    let needle = format!("\\{}{{", command);
    let start = text.find(&needle)?;
    let open = start + needle.len() - 1;
    let close = find_matching_brace(text, open)?;
    Some(&text[open + 1..close])
}

/// The paper title, empty when there is no `\title{...}`.
pub fn extract_title(latex: &str) -> String {
    first_argument(latex, "title").unwrap_or_default().to_string()
}

/// The first `\author{...}` block including the command itself.
pub fn extract_authors(latex: &str) -> String {
    first_argument(latex, "author")
        .map(|body| format!("\\author{{{}}}", body))
        .unwrap_or_default()
}

/// The first abstract environment, markers retained.
pub fn extract_abstract(latex: &str) -> String {
    ABSTRACT_PATTERN
        .captures(latex)
        .map(|caps| format!("\\begin{{abstract}}{}\\end{{abstract}}", &caps[1]))
        .unwrap_or_default()
}

/// Every line starting with `\newcommand`, joined by newlines.
pub fn extract_newcommands(latex: &str) -> String {
    NEWCOMMAND_PATTERN
        .find_iter(latex)
        .map(|m| m.as_str().trim_end_matches('\r'))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_brace_counts_nesting() {
        let text = r"\title{The $\mathbb{R}$ {case}} tail";
        let open = text.find('{').unwrap();
        let close = find_matching_brace(text, open).unwrap();
        assert_eq!(&text[open + 1..close], r"The $\mathbb{R}$ {case}");
    }

    #[test]
    fn matching_brace_ignores_escaped_braces() {
        let text = r"{a \} b} c";
        assert_eq!(find_matching_brace(text, 0), Some(7));
        assert_eq!(find_matching_brace("{never", 0), None);
        assert_eq!(find_matching_brace("x{}", 0), None);
    }

    #[test]
    fn markers_are_found_in_order_with_star_variants() {
        let text = "\\section{Intro}\nA\n\\section*{Setup of $\\{x\\}$}\nB\\sectionmark{no}";
        let markers = find_markers(text, "section");
        let titles: Vec<_> = markers.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Setup of $\\{x\\}$"]);
        assert_eq!(markers[0].start, 0);
        assert_eq!(&text[markers[1].start..markers[1].start + 9], "\\section*");
    }

    #[test]
    fn section_scan_does_not_pick_up_subsections() {
        let text = "\\subsection{A}\\subsubsection{B}\\section{C}";
        let sections = find_markers(text, "section");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "C");
        assert_eq!(find_markers(text, "subsection").len(), 1);
    }

    #[test]
    fn title_and_authors_use_brace_depth() {
        let latex = r"\title{On \emph{nested} titles}\author{A. One \and B. {Two}}";
        assert_eq!(extract_title(latex), r"On \emph{nested} titles");
        assert_eq!(extract_authors(latex), r"\author{A. One \and B. {Two}}");
        assert_eq!(extract_title("no title"), "");
        assert_eq!(extract_authors("no author"), "");
    }

    #[test]
    fn abstract_keeps_environment_markers() {
        let latex = "x\\begin{abstract}\nWe show.\n\\end{abstract}y";
        assert_eq!(
            extract_abstract(latex),
            "\\begin{abstract}\nWe show.\n\\end{abstract}"
        );
        assert_eq!(extract_abstract("nothing"), "");
    }

    #[test]
    fn newcommands_are_whole_lines() {
        let latex = "\\newcommand{\\R}{\\mathbb{R}}\ntext \\newcommand{\\no}{}\n\\newcommand{\\N}{\\mathbb{N}}\n";
        assert_eq!(
            extract_newcommands(latex),
            "\\newcommand{\\R}{\\mathbb{R}}\n\\newcommand{\\N}{\\mathbb{N}}"
        );
    }
}
