//! Maps engine runtime-log lines into a closed taxonomy and asserts the
//! absence of critical findings (spec §4.8, C11).

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::envelope::Severity;
use crate::core::error::UnityToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    BrokenPptr,
    UdonNullref,
    VariantOverrideMismatch,
    DuplicateEventSystem,
    MissingComponent,
    Unknown,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::BrokenPptr => "BROKEN_PPTR",
            Category::UdonNullref => "UDON_NULLREF",
            Category::VariantOverrideMismatch => "VARIANT_OVERRIDE_MISMATCH",
            Category::DuplicateEventSystem => "DUPLICATE_EVENTSYSTEM",
            Category::MissingComponent => "MISSING_COMPONENT",
            Category::Unknown => "UNKNOWN",
        }
    }

    /// Default policy severity (spec §4.8); callers may downgrade via
    /// [`ClassifyOptions::downgrade`].
    pub fn default_severity(self) -> Severity {
        match self {
            Category::BrokenPptr | Category::UdonNullref => Severity::Critical,
            Category::VariantOverrideMismatch | Category::MissingComponent => Severity::Error,
            Category::DuplicateEventSystem => Severity::Warning,
            Category::Unknown => Severity::Info,
        }
    }
}

/// Ordered so that a line matching more than one pattern resolves to the
/// earliest (spec: "ordered pattern list"); `DUPLICATE_EVENTSYSTEM` is
/// explicitly low priority and sits last before the `UNKNOWN` fallback.
const PATTERNS: &[(&str, Category)] = &[
    ("PPtr.Fixer", Category::BrokenPptr),
    ("the referenced script", Category::BrokenPptr),
    ("UdonBehaviour", Category::UdonNullref),
    ("NullReferenceException", Category::UdonNullref),
    ("PrefabInstance", Category::VariantOverrideMismatch),
    ("override mismatch", Category::VariantOverrideMismatch),
    ("Missing component", Category::MissingComponent),
    ("MissingComponentException", Category::MissingComponent),
    ("EventSystem", Category::DuplicateEventSystem),
];

pub fn classify_line(line: &str) -> Category {
    for (pattern, category) in PATTERNS {
        if line.contains(pattern) {
            return *category;
        }
    }
    Category::Unknown
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationResult {
    pub counts: BTreeMap<&'static str, usize>,
    pub matched_lines: Vec<(Category, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifyOptions {
    /// Categories forced to `warning` regardless of their default severity.
    pub downgrade: Vec<Category>,
}

pub fn classify_log(content: &str) -> ClassificationResult {
    let mut result = ClassificationResult::default();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let category = classify_line(line);
        *result.counts.entry(category.as_str()).or_insert(0) += 1;
        if category != Category::Unknown {
            result.matched_lines.push((category, line.to_string()));
        }
    }
    result
}

pub fn classify_log_file(path: &Path) -> Result<ClassificationResult, UnityToolError> {
    let content = std::fs::read_to_string(path)?;
    Ok(classify_log(&content))
}

fn effective_severity(category: Category, options: &ClassifyOptions) -> Severity {
    if options.downgrade.contains(&category) {
        Severity::Warning
    } else {
        category.default_severity()
    }
}

/// `Err` if any category whose effective severity is `error`/`critical`
/// has a nonzero count; the codes returned are `RUN001` (critical found)
/// and `RUN002` (error found) per the closed registry.
pub fn assert_no_critical_errors(
    result: &ClassificationResult,
    options: &ClassifyOptions,
) -> Result<(), UnityToolError> {
    let mut worst: Option<(Severity, Category)> = None;
    for (category, text) in [
        (Category::BrokenPptr, "BROKEN_PPTR"),
        (Category::UdonNullref, "UDON_NULLREF"),
        (Category::VariantOverrideMismatch, "VARIANT_OVERRIDE_MISMATCH"),
        (Category::MissingComponent, "MISSING_COMPONENT"),
        (Category::DuplicateEventSystem, "DUPLICATE_EVENTSYSTEM"),
    ] {
        let count = result.counts.get(text).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }
        let severity = effective_severity(category, options);
        if !severity.is_failure() {
            continue;
        }
        if worst.map(|(s, _)| severity > s).unwrap_or(true) {
            worst = Some((severity, category));
        }
    }

    match worst {
        Some((Severity::Critical, category)) => Err(UnityToolError::Integrity {
            code: "RUN001",
            message: format!("critical runtime finding: {}", category.as_str()),
        }),
        Some((_, category)) => Err(UnityToolError::Integrity {
            code: "RUN002",
            message: format!("runtime error finding: {}", category.as_str()),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pptr_line_classified_and_critical() {
        let result = classify_log("PPtr.Fixer warning: script reference lost\n");
        assert_eq!(result.counts.get("BROKEN_PPTR"), Some(&1));
        let options = ClassifyOptions::default();
        let err = assert_no_critical_errors(&result, &options).unwrap_err();
        assert_eq!(err.code(), Some("RUN001"));
    }

    #[test]
    fn duplicate_eventsystem_is_warning_only() {
        let result = classify_log("Multiple EventSystem components found\n");
        let options = ClassifyOptions::default();
        assert!(assert_no_critical_errors(&result, &options).is_ok());
    }

    #[test]
    fn unmatched_line_is_unknown_and_non_failing() {
        let result = classify_log("all systems nominal\n");
        assert_eq!(result.counts.get("UNKNOWN"), Some(&1));
        assert!(assert_no_critical_errors(&result, &ClassifyOptions::default()).is_ok());
    }

    #[test]
    fn missing_component_is_error_not_critical() {
        let result = classify_log("MissingComponentException on GameObject 'Foo'\n");
        let err = assert_no_critical_errors(&result, &ClassifyOptions::default()).unwrap_err();
        assert_eq!(err.code(), Some("RUN002"));
    }

    #[test]
    fn downgrade_hook_suppresses_failure() {
        let result = classify_log("PPtr.Fixer warning: script reference lost\n");
        let options = ClassifyOptions {
            downgrade: vec![Category::BrokenPptr],
        };
        assert!(assert_no_critical_errors(&result, &options).is_ok());
    }
}
