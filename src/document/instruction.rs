/// Template used when no instruction template file is supplied.
pub const DEFAULT_TEMPLATE: &str = r#"You are an assistant that helps the user read the paper "{title}".

Answer using the contents of the paper. To read it, call one of the functions:
- `search_from_section_names`: retrieves chunks by [section, subsection, subsubsection] names. Use the table of contents below to pick names.
- `search_from_text`: retrieves chunks whose embeddings are most similar to a query.

Quote the LaTeX source when it helps, and say so when the paper does not answer the question.

**Table of contents**:

{toc}"#;

/// Substitutes `{name}` placeholders in `template`.
///
/// `{{` and `}}` produce literal braces. Placeholders without a value are
/// left as written.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{') {
            if let Some(close) = tail.find('}') {
                let name = &tail[1..close];
                if let Some((_, value)) = values.iter().find(|(key, _)| *key == name) {
                    out.push_str(value);
                    rest = &tail[close + 1..];
                    continue;
                }
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Builds the system instruction for a paper.
///
/// `newcommands` is appended as a fenced LaTeX block when non-empty.
pub fn compose_instruction(template: &str, title: &str, toc: &str, newcommands: &str) -> String {
    let mut instruction = render_template(template, &[("title", title), ("toc", toc)]);
    if !newcommands.is_empty() {
        instruction.push_str(&format!(
            "\n\n**New LaTeX commands**:\n\n```latex\n{}\n```\n",
            newcommands
        ));
    }
    instruction
}
