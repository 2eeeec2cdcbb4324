/*
 * naming.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Identifier naming conventions.
//!
//! A convention maps host identifiers (filter names, allow-listed member
//! names) to the names templates use, decides whether map keys compare
//! case-insensitively, and decides whether an operator written in a
//! template matches a registered operator name.

use std::fmt::Debug;

use once_cell::sync::Lazy;
use regex::Regex;

pub trait NamingConvention: Debug + Send + Sync {
    /// Map a host identifier to the name templates refer to it by.
    fn member_name(&self, name: &str) -> String;

    /// Whether variable keys compare without regard to case.
    fn case_insensitive_keys(&self) -> bool;

    /// Whether `written` (from a template) refers to the operator
    /// registered as `registered`.
    fn operator_equals(&self, registered: &str, written: &str) -> bool;
}

static ACRONYM_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());
static WORD_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z\d])([A-Z])").unwrap());

/// `snake_case` names with case-insensitive keys. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubyNamingConvention;

impl RubyNamingConvention {
    fn snake_case(name: &str) -> String {
        let step = ACRONYM_BOUNDARY.replace_all(name, "${1}_${2}");
        WORD_BOUNDARY.replace_all(&step, "${1}_${2}").to_lowercase()
    }
}

impl NamingConvention for RubyNamingConvention {
    fn member_name(&self, name: &str) -> String {
        Self::snake_case(name)
    }

    fn case_insensitive_keys(&self) -> bool {
        true
    }

    fn operator_equals(&self, registered: &str, written: &str) -> bool {
        Self::snake_case(registered) == written
    }
}

/// Host names used verbatim with case-sensitive keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct CSharpNamingConvention;

fn with_first_char(name: &str, upper: bool) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if upper => first.to_uppercase().chain(chars).collect(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl NamingConvention for CSharpNamingConvention {
    fn member_name(&self, name: &str) -> String {
        name.to_string()
    }

    fn case_insensitive_keys(&self) -> bool {
        false
    }

    fn operator_equals(&self, registered: &str, written: &str) -> bool {
        with_first_char(registered, true) == written || with_first_char(registered, false) == written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ruby_member_names() {
        let ruby = RubyNamingConvention;
        assert_eq!(ruby.member_name("NonZero"), "non_zero");
        assert_eq!(ruby.member_name("HTMLParser"), "html_parser");
        assert_eq!(ruby.member_name("moneyWithUnderscore"), "money_with_underscore");
        assert_eq!(ruby.member_name("size"), "size");
        assert_eq!(ruby.member_name("Version2Name"), "version2_name");
    }

    #[test]
    fn test_ruby_operator_matching() {
        let ruby = RubyNamingConvention;
        assert!(ruby.operator_equals("IsMultipleOf", "is_multiple_of"));
        assert!(ruby.operator_equals("startsWith", "starts_with"));
        assert!(!ruby.operator_equals("IsMultipleOf", "isMultipleOf"));
        assert!(!ruby.operator_equals("startsWith", "StartsWith"));
    }

    #[test]
    fn test_csharp_member_names_are_verbatim() {
        let cs = CSharpNamingConvention;
        assert_eq!(cs.member_name("NonZero"), "NonZero");
        assert!(!cs.case_insensitive_keys());
    }

    #[test]
    fn test_csharp_operator_matching() {
        let cs = CSharpNamingConvention;
        assert!(cs.operator_equals("startsWith", "StartsWith"));
        assert!(cs.operator_equals("StartsWith", "startsWith"));
        assert!(!cs.operator_equals("startsWith", "starts_with"));
    }
}
