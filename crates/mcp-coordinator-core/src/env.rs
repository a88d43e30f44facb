use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is a valid regex")
});

/// Concrete environment for a child process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedEnv {
    /// Ambient environment overlaid with the resolved template entries
    pub vars: HashMap<String, String>,
    /// Placeholder names that had no ambient value, sorted and deduplicated
    pub unresolved: Vec<String>,
}

/// Snapshot of the coordinator's own environment
///
/// Variables whose name or value is not valid UTF-8 cannot be expressed in a
/// manifest template and are skipped.
pub fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Replace every `${NAME}` in `value` with its ambient value, or `""` if unset
///
/// Substituted text is never re-scanned.
pub fn expand_placeholders(value: &str, ambient: &HashMap<String, String>) -> String {
    expand(value, ambient, &mut BTreeSet::new())
}

fn expand(value: &str, ambient: &HashMap<String, String>, missing: &mut BTreeSet<String>) -> String {
    PLACEHOLDER
        .replace_all(value, |caps: &Captures<'_>| {
            let name = &caps[1];
            match ambient.get(name) {
                Some(resolved) => resolved.clone(),
                None => {
                    missing.insert(name.to_string());
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Build the child environment from a manifest template
///
/// Starts from a full copy of `ambient`, then applies each template entry
/// with its placeholders expanded, so a manifest only adds or overrides keys.
pub fn resolve_env(template: &HashMap<String, String>, ambient: &HashMap<String, String>) -> ResolvedEnv {
    let mut missing = BTreeSet::new();
    let mut vars = ambient.clone();

    for (key, value) in template {
        let resolved = expand(value, ambient, &mut missing);
        vars.insert(key.clone(), resolved);
    }

    ResolvedEnv {
        vars,
        unresolved: missing.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambient(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_placeholder_expanded_in_place() {
        let env = ambient(&[("FOO", "bar")]);
        let template = ambient(&[("X", "prefix-${FOO}-suffix")]);

        let resolved = resolve_env(&template, &env);
        assert_eq!(resolved.vars.get("X").map(String::as_str), Some("prefix-bar-suffix"));
        assert!(resolved.unresolved.is_empty());
    }

    #[test]
    fn test_unset_placeholder_becomes_empty() {
        let template = ambient(&[("Y", "${UNSET_VAR}")]);

        let resolved = resolve_env(&template, &HashMap::new());
        assert_eq!(resolved.vars.get("Y").map(String::as_str), Some(""));
        assert_eq!(resolved.unresolved, vec!["UNSET_VAR".to_string()]);
    }

    #[test]
    fn test_ambient_inherited_and_overridden() {
        let env = ambient(&[("PATH", "/usr/bin"), ("HOME", "/root")]);
        let template = ambient(&[("HOME", "/srv/${PATH}")]);

        let resolved = resolve_env(&template, &env);
        assert_eq!(resolved.vars.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(resolved.vars.get("HOME").map(String::as_str), Some("/srv//usr/bin"));
    }

    #[test]
    fn test_no_recursive_expansion() {
        let env = ambient(&[("OUTER", "${INNER}"), ("INNER", "deep")]);
        assert_eq!(expand_placeholders("${OUTER}", &env), "${INNER}");
    }

    #[test]
    fn test_each_occurrence_resolved() {
        let env = ambient(&[("A", "1"), ("B", "2")]);
        assert_eq!(expand_placeholders("${A}:${B}:${A}:${C}", &env), "1:2:1:");
    }

    #[test]
    fn test_malformed_placeholders_left_alone() {
        let env = ambient(&[("A", "1")]);
        assert_eq!(expand_placeholders("$A ${A ${} ${A-B}", &env), "$A ${A ${} ${A-B}");
    }

    #[test]
    fn test_set_but_empty_counts_as_resolved() {
        let env = ambient(&[("EMPTY", "")]);
        let template = ambient(&[("Z", "${EMPTY}")]);

        let resolved = resolve_env(&template, &env);
        assert!(resolved.unresolved.is_empty());
        assert_eq!(resolved.vars.get("Z").map(String::as_str), Some(""));
    }
}
