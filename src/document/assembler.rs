use lazy_static::lazy_static;
use log::warn;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::DocumentError;

/// Deepest `\input` chain followed before a directive is left unresolved.
pub const MAX_INCLUDE_DEPTH: usize = 16;

lazy_static! {
    static ref INCLUDE_PATTERN: Regex = Regex::new(r"\\(input|include)\{([^}]+)\}").unwrap();
    static ref BIBLIOGRAPHY_DIRECTIVE: Regex = Regex::new(r"\\bibliography\{[^}]+\}").unwrap();
}

/// Reads `root` and expands it into one LaTeX string.
///
/// `\input{x}` and `\include{x}` are replaced by the contents of `x.tex`,
/// resolved against the directory of `root`. If `<root>.bbl` exists it is
/// spliced in after the first `\bibliography{...}` directive.
pub fn assemble(root: &Path) -> Result<String, DocumentError> {
    let content = fs::read_to_string(root).map_err(|source| DocumentError::Read {
        path: root.to_path_buf(),
        source,
    })?;
    let base_dir = root.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

    let mut chain = HashSet::new();
    if let Ok(canonical) = root.canonicalize() {
        chain.insert(canonical);
    }
    let mut content = expand_includes(&content, &base_dir, &mut chain, 0);

    let bbl_path = root.with_extension("bbl");
    if bbl_path.exists() {
        let bbl = fs::read_to_string(&bbl_path).map_err(|source| DocumentError::Read {
            path: bbl_path.clone(),
            source,
        })?;
        content = splice_bibliography(&content, &bbl);
    }

    Ok(content)
}

fn include_path(base_dir: &Path, name: &str) -> PathBuf {
    let file = if name.ends_with(".tex") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}.tex", name))
    };
    if file.is_absolute() {
        file
    } else {
        base_dir.join(file)
    }
}

fn expand_includes(content: &str, base_dir: &Path, chain: &mut HashSet<PathBuf>, depth: usize) -> String {
    INCLUDE_PATTERN
        .replace_all(content, |caps: &Captures| {
            let directive = caps[0].to_string();
            let path = include_path(base_dir, caps[2].trim());

            if depth >= MAX_INCLUDE_DEPTH {
                warn!("include depth limit reached at '{}'. Leaving the {} command unchanged.", path.display(), &caps[1]);
                return directive;
            }

            let included = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(_) => {
                    warn!("file '{}' not found. Leaving the {} command unchanged.", path.display(), &caps[1]);
                    return directive;
                }
            };

            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !chain.insert(key.clone()) {
                warn!("'{}' includes itself. Leaving the {} command unchanged.", path.display(), &caps[1]);
                return directive;
            }
            let expanded = expand_includes(&included, base_dir, chain, depth + 1);
            chain.remove(&key);
            expanded
        })
        .into_owned()
}

/// Inserts `bbl` on a new line after the first `\bibliography{...}`.
pub fn splice_bibliography(content: &str, bbl: &str) -> String {
    match BIBLIOGRAPHY_DIRECTIVE.find(content) {
        Some(m) => format!("{}\n{}{}", &content[..m.end()], bbl, &content[m.end()..]),
        None => content.to_string(),
    }
}
