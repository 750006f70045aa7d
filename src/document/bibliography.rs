use lazy_static::lazy_static;
use regex::Regex;

/// Default byte budget for one bibliography part.
pub const DEFAULT_MAX_BYTES: usize = 10_000;

lazy_static! {
    static ref BIBLIOGRAPHY_PATTERN: Regex = Regex::new(
        r"(?s)\\thebibliography\{(.+?)\}|\\begin\{thebibliography\}(.+?)\\end\{thebibliography\}"
    )
    .unwrap();
    static ref BIBITEM_HEADER: Regex = Regex::new(r"\\bibitem(?:\[[^\]]+\])?\{[^}]+\}").unwrap();
}

/// The first bibliography block, or an empty string.
pub fn extract_bibliography(latex: &str) -> String {
    BIBLIOGRAPHY_PATTERN
        .find(latex)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Removes every bibliography block so it is not parsed as section content.
pub fn remove_bibliography(latex: &str) -> String {
    BIBLIOGRAPHY_PATTERN.replace_all(latex, "").into_owned()
}

/// Splits a bibliography into `\bibitem` entries.
///
/// Each entry starts at an item header and runs up to the next header or the
/// end of the text.
pub fn bibitems(bibliography: &str) -> Vec<&str> {
    let starts: Vec<usize> = BIBITEM_HEADER
        .find_iter(bibliography)
        .map(|m| m.start())
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(bibliography.len());
            &bibliography[start..end]
        })
        .collect()
}

/// Groups bibliography entries into parts of at most `max_bytes` UTF-8 bytes.
///
/// Every entry is followed by a newline inside its part and the newline
/// counts against the budget. An entry larger than the budget becomes a
/// part of its own. A bibliography with no `\bibitem` at all is returned
/// whole as a single part.
pub fn split_bibliography(bibliography: &str, max_bytes: usize) -> Vec<String> {
    let entries = bibitems(bibliography);
    if entries.is_empty() {
        return if bibliography.trim().is_empty() {
            Vec::new()
        } else {
            vec![bibliography.to_string()]
        };
    }

    let mut parts = Vec::new();
    let mut current = String::new();

    for entry in entries {
        let entry_size = entry.len() + 1;
        if !current.is_empty() && current.len() + entry_size > max_bytes {
            parts.push(std::mem::take(&mut current));
        }
        current.push_str(entry);
        current.push('\n');
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Node titles for the bibliography parts: `Bibliography`, or
/// `Bibliography_1..N` when there is more than one part.
pub fn part_titles(count: usize) -> Vec<String> {
    if count == 1 {
        return vec!["Bibliography".to_string()];
    }
    (1..=count).map(|i| format!("Bibliography_{}", i)).collect()
}
