//! Input parsing.
//!
//! Turns user-supplied `name=value` text into typed values according to
//! the job's input declarations.

use std::collections::BTreeMap;

use super::schema::{InputType, Job};
use super::JobError;
use crate::core::Value;

/// Parse a boolean the way users type it on a command line.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Some(true),
        "no" | "n" | "false" | "0" => Some(false),
        _ => None,
    }
}

impl InputType {
    /// Parse text into a value of this type.
    pub fn parse(self, text: &str) -> Option<Value> {
        match self {
            Self::String => Some(Value::from(text)),
            Self::Bool => parse_bool(text).map(Value::Bool),
            Self::Int => text.trim().parse::<i64>().ok().map(Value::Int),
        }
    }
}

/// Resolve the values of all declared inputs.
///
/// Supplied text wins over defaults; a missing required input, an
/// undeclared name or unparsable text is an error. Optional inputs without
/// a default resolve to null.
pub fn parse_inputs(
    job: &Job,
    provided: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Value>, JobError> {
    if let Some(unknown) = provided.keys().find(|name| !job.inputs.contains_key(name.as_str())) {
        return Err(JobError::Input(format!("Unknown input '{unknown}' for job {}", job.job_id)));
    }

    let mut values = BTreeMap::new();
    for (name, spec) in &job.inputs {
        let value = match provided.get(name) {
            Some(text) => spec.input_type.parse(text).ok_or_else(|| {
                JobError::Input(format!(
                    "Input '{name}' expects a {}, got '{text}'",
                    spec.input_type
                ))
            })?,
            None => match spec.default {
                Some(ref default) => default.clone(),
                None if spec.required => {
                    return Err(JobError::Input(format!("Input '{name}' is required")));
                }
                None => Value::Null,
            },
        };
        values.insert(name.clone(), value);
    }

    Ok(values)
}

/// Split `name=value` assignments from the command line.
pub fn parse_assignments(assignments: &[String]) -> Result<BTreeMap<String, String>, JobError> {
    assignments
        .iter()
        .map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| JobError::Input(format!("Expected name=value, got '{item}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::parse_job_str;

    const JOB: &str = r#"
name: inputs
inputs:
  count:
    type: int
    required: true
  verbose:
    type: bool
    default: false
  label:
    type: string
  owner:
    default: platform
steps:
  - name: noop
    run: "true"
"#;

    fn provided(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_parse_bool_accepts_common_spellings() {
        for text in ["yes", "Y", "TRUE", "1", " true "] {
            assert_eq!(parse_bool(text), Some(true), "{text}");
        }
        for text in ["no", "N", "False", "0"] {
            assert_eq!(parse_bool(text), Some(false), "{text}");
        }
        for text in ["", "maybe", "on", "2"] {
            assert_eq!(parse_bool(text), None, "{text}");
        }
    }

    #[test]
    fn test_required_int_without_value_fails() {
        let job = parse_job_str("inputs", JOB).unwrap();
        let err = parse_inputs(&job, &provided(&[])).unwrap_err();
        assert!(matches!(err, JobError::Input(ref m) if m.contains("'count' is required")));
    }

    #[test]
    fn test_values_defaults_and_nulls() {
        let job = parse_job_str("inputs", JOB).unwrap();
        let values = parse_inputs(&job, &provided(&[("count", "12"), ("verbose", "y")])).unwrap();

        assert_eq!(values["count"], Value::Int(12));
        assert_eq!(values["verbose"], Value::Bool(true));
        assert_eq!(values["label"], Value::Null);
        assert_eq!(values["owner"], Value::from("platform"));
    }

    #[test]
    fn test_bad_values_fail() {
        let job = parse_job_str("inputs", JOB).unwrap();
        assert!(parse_inputs(&job, &provided(&[("count", "twelve")])).is_err());
        assert!(parse_inputs(&job, &provided(&[("count", "1"), ("verbose", "maybe")])).is_err());
    }

    #[test]
    fn test_unknown_input_fails() {
        let job = parse_job_str("inputs", JOB).unwrap();
        let err = parse_inputs(&job, &provided(&[("count", "1"), ("colour", "red")])).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_parse_assignments() {
        let parsed = parse_assignments(&["a=1".to_string(), "b=x=y".to_string()]).unwrap();
        assert_eq!(parsed["a"], "1");
        assert_eq!(parsed["b"], "x=y");

        assert!(parse_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_assignments(&["=1".to_string()]).is_err());
    }
}
