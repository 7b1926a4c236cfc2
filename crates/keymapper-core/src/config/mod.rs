// Keymapper Config API
// Device match rules and the file parser that produces them

mod parser;
mod rule;

pub use parser::{Config, ConfigError, ConfigSource};
pub use rule::{MatchRule, CATCH_ALL_PATTERN};
