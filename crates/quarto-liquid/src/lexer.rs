/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Splitting template source into tokens.
//!
//! Tokens are literal text, `{% tag %}` markup and `{{ output }}` markup.
//! A `-` just inside a delimiter trims adjacent whitespace: `{%-` and
//! `{{-` remove spaces and tabs before the token, `-%}` and `-}}` remove
//! one following newline or run of spaces and tabs.

use once_cell::sync::Lazy;
use regex::Regex;

static LITERAL_SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\{\{\{\s?(.*?)\s*\}\}\}$").unwrap());
static COMMENT_SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\{\s?#\s?(.*?)\s*#\s?\}$").unwrap());
static TRIM_BEFORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*(\{\{|\{%)-").unwrap());
static TRIM_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-(\}\}|%\})(?:\r?\n|[ \t]+)?").unwrap());
static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{%.*?%\}|\{\{.*?\}\}?|\{\{|\{%").unwrap());

/// Rewrite a source consisting entirely of a shorthand form into the
/// equivalent tag form.
pub fn expand_shorthand(source: &str) -> String {
    if let Some(caps) = LITERAL_SHORTHAND.captures(source) {
        return format!("{{% literal %}}{}{{% endliteral %}}", &caps[1]);
    }
    if let Some(caps) = COMMENT_SHORTHAND.captures(source) {
        return format!("{{% comment %}}{}{{% endcomment %}}", &caps[1]);
    }
    source.to_string()
}

fn trim_whitespace(source: &str) -> String {
    let trimmed = TRIM_BEFORE.replace_all(source, "$1");
    TRIM_AFTER.replace_all(&trimmed, "$1").into_owned()
}

/// Split `source` into literal and markup tokens.
pub fn tokenize(source: &str) -> Vec<String> {
    if source.is_empty() {
        return Vec::new();
    }
    let source = trim_whitespace(&expand_shorthand(source));

    let mut tokens = Vec::new();
    let mut last = 0;
    for m in TOKEN.find_iter(&source) {
        if m.start() > last {
            tokens.push(source[last..m.start()].to_string());
        }
        tokens.push(m.as_str().to_string());
        last = m.end();
    }
    if last < source.len() {
        tokens.push(source[last..].to_string());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        assert_eq!(tokenize(" "), vec![" "]);
        assert_eq!(tokenize("hello world"), vec!["hello world"]);
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_outputs_and_tags() {
        assert_eq!(tokenize("{{funk}}"), vec!["{{funk}}"]);
        assert_eq!(tokenize(" {{funk}} "), vec![" ", "{{funk}}", " "]);
        assert_eq!(
            tokenize(" {% comment %} {% endcomment %} "),
            vec![" ", "{% comment %}", " ", "{% endcomment %}", " "]
        );
        assert_eq!(tokenize("  {% comment %} "), vec!["  ", "{% comment %}", " "]);
    }

    #[test]
    fn test_tags_may_span_lines() {
        assert_eq!(tokenize("{% if\n x %}"), vec!["{% if\n x %}"]);
    }

    #[test]
    fn test_unterminated_markup_is_its_own_token() {
        assert_eq!(tokenize("a {{ b"), vec!["a ", "{{", " b"]);
    }

    #[test]
    fn test_whitespace_control() {
        assert_eq!(
            tokenize("a  {%- if x -%}\n b"),
            vec!["a", "{% if x %}", " b"]
        );
        assert_eq!(tokenize("x \t{{- y -}}  z"), vec!["x", "{{ y }}", "z"]);
    }

    #[test]
    fn test_shorthands() {
        assert_eq!(
            expand_shorthand("{{{ {{ raw }} }}}"),
            "{% literal %}{{ raw }}{% endliteral %}"
        );
        assert_eq!(
            expand_shorthand("{# note #}"),
            "{% comment %}note{% endcomment %}"
        );
        assert_eq!(expand_shorthand("plain"), "plain");
    }
}
