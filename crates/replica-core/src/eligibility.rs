//! Maintenance-noise filtering on pull request titles.

use crate::model::EligibilityVerdict;

/// Markers that identify housekeeping pull requests. Matched against the
/// trimmed, lowercased title; a marker ending in a word character only
/// matches at a word boundary.
pub const NOISE_PREFIXES: &[&str] = &[
    "build(deps)",
    "[dependabot]",
    "[renovate]",
    "update dependency",
    "bump ",
    "deps",
    "chore",
    "ci",
    "build",
    "test",
    "docs",
    "style",
    "refactor",
];

/// Decide whether an upstream pull request is worth replicating.
pub fn is_eligible(title: &str) -> EligibilityVerdict {
    let normalized = title.trim().to_lowercase();
    if normalized.is_empty() {
        return EligibilityVerdict::ineligible("title is empty");
    }

    match NOISE_PREFIXES
        .iter()
        .find(|prefix| matches_marker(&normalized, prefix))
    {
        Some(prefix) => EligibilityVerdict::ineligible(format!(
            "maintenance pull request (matches '{}')",
            prefix.trim()
        )),
        None => EligibilityVerdict::eligible(),
    }
}

fn matches_marker(title: &str, marker: &str) -> bool {
    let Some(rest) = title.strip_prefix(marker) else {
        return false;
    };
    // "test" must not swallow "testing framework".
    let ends_in_word = marker
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric());
    !ends_in_word || rest.chars().next().map_or(true, |c| !c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_titles_are_ineligible() {
        for title in [
            "chore: bump dependency",
            "Chore(deps): update serde",
            "  CI: fix workflow  ",
            "build(deps): bump tokio from 1.35 to 1.36",
            "Bump rack from 2.2.6 to 2.2.8",
            "docs: typo",
            "style: rustfmt",
            "refactor!: split module",
            "test: cover edge case",
            "[Dependabot] weekly updates",
            "Update dependency rails to v7.1",
        ] {
            let verdict = is_eligible(title);
            assert!(!verdict.eligible, "expected {title:?} to be filtered");
            assert!(verdict.reason.is_some());
        }
    }

    #[test]
    fn test_feature_titles_are_eligible() {
        for title in [
            "Add retry support",
            "Fix MTA-STS policy parsing",
            "Testing framework overhaul",
            "Documentation site redesign",
            "Cidr allow-list for SMTP",
            "Builder pattern for messages",
        ] {
            let verdict = is_eligible(title);
            assert!(verdict.eligible, "expected {title:?} to be eligible");
            assert!(verdict.reason.is_none());
        }
    }

    #[test]
    fn test_reason_names_matched_marker() {
        let verdict = is_eligible("ci: cache cargo registry");
        assert!(verdict.reason.unwrap().contains("'ci'"));
    }

    #[test]
    fn test_empty_title_is_ineligible() {
        assert!(!is_eligible("   ").eligible);
    }
}
