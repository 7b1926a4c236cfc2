// Keymapper Input Layer - Device Matching
// First-match-wins lookup of a device identity in the rule list

use std::sync::Arc;

use crate::config::MatchRule;

/// Find the first rule whose pattern matches `identity`.
///
/// Patterns are searched, not anchored: a rule with `id = "046d"` matches
/// `0003:046d:c52b:0111`. Anchor the pattern explicitly (`^...$`) for a
/// full-string match.
pub fn match_rule<'a>(identity: &str, rules: &'a [Arc<MatchRule>]) -> Option<&'a Arc<MatchRule>> {
    rules.iter().find(|rule| rule.matches(identity))
}
