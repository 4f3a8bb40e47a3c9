//! Variable interpolation for spec files.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Interpolate declared variables in a string.
///
/// Supports `${VAR}` syntax. Undeclared variables are left verbatim, and substituted
/// values are never expanded again.
///
/// ```text
/// expand("${BIN} --flag", {BIN: "/usr/bin/tool"}) == "/usr/bin/tool --flag"
/// expand("${MISSING}", {})                        == "${MISSING}"
/// ```
pub fn expand(s: &str, vars: &BTreeMap<String, String>) -> String {
    if vars.is_empty() || !s.contains("${") {
        return s.to_string();
    }

    PLACEHOLDER
        .replace_all(s, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expand_declared() {
        let vars = vars(&[("GREETING", "hello")]);
        assert_eq!(expand("${GREETING}", &vars), "hello");
        assert_eq!(
            expand("prefix_${GREETING}_suffix", &vars),
            "prefix_hello_suffix"
        );
        assert_eq!(expand("no vars here", &vars), "no vars here");
        assert_eq!(expand("", &vars), "");
    }

    #[test]
    fn test_expand_undeclared_is_left_verbatim() {
        let vars = vars(&[("A", "1")]);
        assert_eq!(expand("${A} ${B}", &vars), "1 ${B}");
        assert_eq!(expand("${B}", &BTreeMap::new()), "${B}");
    }

    #[test]
    fn test_expand_is_single_pass() {
        let vars = vars(&[("A", "${B}"), ("B", "deep")]);
        assert_eq!(expand("${A}", &vars), "${B}");
    }

    #[test]
    fn test_expand_treats_other_dollars_literally() {
        let vars = vars(&[("HOME", "/root")]);
        assert_eq!(expand("$HOME", &vars), "$HOME");
        assert_eq!(expand("cost: $5", &vars), "cost: $5");
        assert_eq!(expand("${HOME", &vars), "${HOME");
        assert_eq!(expand("${not valid}", &vars), "${not valid}");
        assert_eq!(expand("$${HOME}", &vars), "$/root");
    }
}
