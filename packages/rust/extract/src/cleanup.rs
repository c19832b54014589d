//! Cleanup passes applied to converted Markdown.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run the cleanup pipeline on raw Markdown from the HTML converter.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = md.to_string();

    result = collapse_blank_lines(&result);
    result = fix_code_fence_languages(&result);
    result = strip_leftover_html(&result);
    result = resolve_relative_links(&result, base_url);
    result = trim_line_ends(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Collapse blank line runs
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into a single blank line. Blank runs
/// inside code fences are kept as written.
fn collapse_blank_lines(md: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut blank_run = 0usize;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            blank_run = 0;
            out.push(line);
            continue;
        }
        if in_fence {
            out.push(line);
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 {
                out.push("");
            }
        } else {
            blank_run = 0;
            out.push(line);
        }
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Code fence language hints
// ---------------------------------------------------------------------------

/// Strip class-style prefixes from fence language hints
/// (`language-js`, `lang-python`, `highlight-rust`).
fn fix_code_fence_languages(md: &str) -> String {
    static LANG_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
    });

    LANG_PREFIX_RE.replace_all(md, "```$1").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip leftover HTML container tags
// ---------------------------------------------------------------------------

/// Remove container tags that survived conversion, preserving their inner
/// text. Lines inside code fences are left untouched.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|figure|figcaption|details|summary)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });

    let mut out = Vec::new();
    let mut in_fence = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push(line.to_string());
            continue;
        }
        if in_fence {
            out.push(line.to_string());
        } else {
            out.push(HTML_TAG_RE.replace_all(line, "").to_string());
        }
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Resolve relative links
// ---------------------------------------------------------------------------

/// Resolve relative URLs in Markdown links against the page URL. Link-shaped
/// text inside code fences is left alone.
fn resolve_relative_links(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));

    let mut out = Vec::new();
    let mut in_fence = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push(line.to_string());
            continue;
        }
        if in_fence {
            out.push(line.to_string());
            continue;
        }

        let resolved_line = LINK_RE.replace_all(line, |caps: &regex::Captures| {
            let text = &caps[1];
            let href = &caps[2];

            if href.starts_with("http://")
                || href.starts_with("https://")
                || href.starts_with('#')
                || href.starts_with("mailto:")
            {
                return format!("[{text}]({href})");
            }

            match base.join(href) {
                Ok(resolved) => format!("[{text}]({resolved})"),
                Err(_) => format!("[{text}]({href})"),
            }
        });
        out.push(resolved_line.into_owned());
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 5: Trailing whitespace
// ---------------------------------------------------------------------------

/// Strip trailing whitespace outside code fences; fence content keeps its
/// whitespace exactly.
fn trim_line_ends(md: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in md.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push(line.trim_end());
            continue;
        }
        out.push(if in_fence { line } else { line.trim_end() });
    }

    out.join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_blank_lines_squashes_runs() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn blank_runs_inside_fences_kept() {
        let input = "a\n\n\n\nb\n\n```\nfirst line\n\n\n\nlast line\n```";
        let result = collapse_blank_lines(input);
        assert!(result.starts_with("a\n\nb"));
        assert!(result.contains("first line\n\n\n\nlast line"));
    }

    #[test]
    fn fence_language_prefix_stripped() {
        let input = "```language-javascript\nconsole.log('hi');\n```";
        assert!(fix_code_fence_languages(input).starts_with("```javascript"));
    }

    #[test]
    fn plain_fence_language_kept() {
        let input = "```rust\nfn main() {}\n```";
        assert_eq!(fix_code_fence_languages(input), input);
    }

    #[test]
    fn leftover_div_stripped() {
        let input = "# Title\n\n<div class=\"note\">Important</div>\n\nMore";
        let result = strip_leftover_html(input);
        assert!(result.contains("Important"));
        assert!(!result.contains("<div"));
    }

    #[test]
    fn fences_protected_from_html_strip() {
        let input = "```html\n<div>kept</div>\n```";
        assert_eq!(strip_leftover_html(input), input);
    }

    #[test]
    fn relative_link_resolved() {
        let base = Url::parse("https://docs.example.com/guide/intro").unwrap();
        let result = resolve_relative_links("[Next](/api/reference)", Some(&base));
        assert_eq!(result, "[Next](https://docs.example.com/api/reference)");
    }

    #[test]
    fn absolute_link_untouched() {
        let base = Url::parse("https://docs.example.com/").unwrap();
        let input = "[Link](https://other.com/page)";
        assert_eq!(resolve_relative_links(input, Some(&base)), input);
    }

    #[test]
    fn link_inside_fence_untouched() {
        let base = Url::parse("https://docs.example.com/").unwrap();
        let input = "```md\n[Next](/api/reference)\n```";
        assert_eq!(resolve_relative_links(input, Some(&base)), input);
    }

    #[test]
    fn trailing_whitespace_inside_fence_kept() {
        let input = "text   \n```\ncode line   \n```";
        assert_eq!(trim_line_ends(input), "text\n```\ncode line   \n```");
    }

    #[test]
    fn pipeline_trims_and_normalizes() {
        let input = "\n\n# Title   \n\n\n\nBody text.  \n\n";
        let result = run_pipeline(input, None);
        assert_eq!(result, "# Title\n\nBody text.");
    }

    #[test]
    fn pipeline_leaves_fence_content_verbatim() {
        let input = "# Title\n\n```\nfirst line\n\n\n\nlast line   \n```";
        let result = run_pipeline(input, None);
        assert!(result.contains("first line\n\n\n\nlast line   \n```"));
    }
}
