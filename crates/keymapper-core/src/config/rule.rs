// Keymapper Config - Match Rules
// Identity pattern plus the keymap applied to matching devices

use std::fmt;

use regex::Regex;

use crate::mapping::Keymap;

/// Pattern of the rule used when no configuration can be loaded.
pub const CATCH_ALL_PATTERN: &str = "^.*$";

/// One device-match rule: an identity pattern and the keymap for devices it matches
#[derive(Debug, Clone)]
pub struct MatchRule {
    pattern: Regex,
    keymap: Keymap,
}

impl MatchRule {
    /// Compile `pattern` into a rule
    pub fn new(pattern: &str, keymap: Keymap) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            keymap,
        })
    }

    /// Rule matching every identity with a pass-through keymap
    pub fn catch_all() -> Self {
        Self {
            pattern: Regex::new(CATCH_ALL_PATTERN).expect("catch-all pattern is valid"),
            keymap: Keymap::new(),
        }
    }

    /// Whether the pattern is found anywhere in `identity`
    pub fn matches(&self, identity: &str) -> bool {
        self.pattern.is_match(identity)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn keymap(&self) -> &Keymap {
        &self.keymap
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{id: {:?}, keymap: {}}}", self.pattern(), self.keymap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Key;

    #[test]
    fn test_matches_is_a_search() {
        let rule = MatchRule::new("046d", Keymap::new()).unwrap();
        assert!(rule.matches("0003:046d:c52b:0111"));
        assert!(!rule.matches("0003:1234:c52b:0111"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(MatchRule::new("(unclosed", Keymap::new()).is_err());
    }

    #[test]
    fn test_catch_all() {
        let rule = MatchRule::catch_all();
        assert_eq!(rule.pattern(), CATCH_ALL_PATTERN);
        assert!(rule.keymap().is_empty());
        assert!(rule.matches("0003:046d:c52b:0111"));
    }

    #[test]
    fn test_display() {
        let mut keymap = Keymap::new();
        keymap.insert(Key(58), [Key(1)]);
        let rule = MatchRule::new("^.*$", keymap).unwrap();
        assert_eq!(
            rule.to_string(),
            r#"{id: "^.*$", keymap: {KEY_CAPSLOCK: [KEY_ESC]}}"#
        );
    }
}
