//! `actions/compute-version`: bump a `MAJOR.MINOR[.PATCH]` version.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::{decode_params, int_or_string, Action, ActionError};
use crate::core::{Outputs, Params, Value};
use crate::engine::Context;

static VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<major>\d+)\.(?P<minor>\d+)(?:\.(?P<patch>\d+))?$").expect("valid version regex")
});

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VersionParams {
    input: String,
    #[serde(rename = "add-major", default, deserialize_with = "int_or_string")]
    add_major: i64,
    #[serde(rename = "add-minor", default, deserialize_with = "int_or_string")]
    add_minor: i64,
    #[serde(rename = "add-patch", default, deserialize_with = "int_or_string")]
    add_patch: i64,
}

/// Adds signed offsets to each version component. Output: `result`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComputeVersion;

impl Action for ComputeVersion {
    fn run(&self, params: &Params, _context: &Context, _dry_run: bool) -> Result<Outputs, ActionError> {
        let params: VersionParams = decode_params(params)?;
        let result =
            compute_version(&params.input, params.add_major, params.add_minor, params.add_patch)?;
        tracing::debug!(input = params.input, result = result, "Computed version");

        let mut outputs = Outputs::new();
        outputs.insert("result".to_string(), Value::from(result));
        Ok(outputs)
    }
}

fn component(caps: &regex::Captures<'_>, name: &str) -> Result<Option<i64>, ActionError> {
    caps.name(name)
        .map(|m| {
            m.as_str()
                .parse::<i64>()
                .map_err(|e| ActionError::InvalidParams(format!("Invalid {name} version number: {e}")))
        })
        .transpose()
}

fn non_negative(name: &str, value: i64) -> Result<i64, ActionError> {
    if value < 0 {
        return Err(ActionError::Failed(format!("Invalid {name} version number: {value}")));
    }
    Ok(value)
}

/// `base + offset`, rejecting results outside `i64`.
fn offset(name: &str, base: i64, add: i64) -> Result<i64, ActionError> {
    let value = base
        .checked_add(add)
        .ok_or_else(|| ActionError::InvalidParams(format!("{name} version number overflows: {base} + {add}")))?;
    non_negative(name, value)
}

/// Apply offsets to a version string.
///
/// A two-part version stays two-part unless `add_patch` is positive, in
/// which case the patch becomes `add_patch`. Any component going negative
/// is an error.
pub fn compute_version(
    input: &str,
    add_major: i64,
    add_minor: i64,
    add_patch: i64,
) -> Result<String, ActionError> {
    let caps = VERSION
        .captures(input)
        .ok_or_else(|| ActionError::InvalidParams(format!("Not a MAJOR.MINOR[.PATCH] version: {input}")))?;

    let major = offset("major", component(&caps, "major")?.unwrap_or_default(), add_major)?;
    let minor = offset("minor", component(&caps, "minor")?.unwrap_or_default(), add_minor)?;
    let patch = match component(&caps, "patch")? {
        Some(patch) => Some(offset("patch", patch, add_patch)?),
        None if add_patch > 0 => Some(add_patch),
        None if add_patch == 0 => None,
        None => {
            return Err(ActionError::Failed(format!(
                "Cannot subtract patch {} from {input}",
                add_patch.unsigned_abs()
            )))
        }
    };

    Ok(match patch {
        Some(patch) => format!("{major}.{minor}.{patch}"),
        None => format!("{major}.{minor}"),
    })
}
