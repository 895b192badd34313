//! Core types and functionality for Slowhand.
//!
//! This module contains the fundamental building blocks shared by the
//! engine and the actions: the value model, configuration, and process
//! execution.

mod config;
mod executor;
mod value;

use std::collections::BTreeMap;

pub use config::{Config, GeneralConfig, JobsConfig, StateConfig};
pub use executor::{run_command, ExecutionResult, Executor, ShellCommand};
pub use value::Value;

/// Parameters handed to an action, already template-resolved.
pub type Params = BTreeMap<String, Value>;

/// Outputs returned by an action.
pub type Outputs = BTreeMap<String, Value>;

/// Generate a lexicographically sortable random name.
///
/// Names generated later compare greater: the millisecond timestamp comes
/// first, followed by 24 random bits.
pub fn random_name(prefix: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().as_u128() & 0x00FF_FFFF;
    let prefix = prefix.trim();
    format!("{prefix}_{timestamp:012x}{suffix:06x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_name_shape() {
        let name = random_name("run");
        let (prefix, rest) = name.split_once('_').unwrap();
        assert_eq!(prefix, "run");
        assert_eq!(rest.len(), 18);
        assert!(rest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_names_differ() {
        assert_ne!(random_name("output"), random_name("output"));
    }
}
