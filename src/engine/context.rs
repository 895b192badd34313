//! Run context: the per-run variable store.
//!
//! The context is a tree of `Value`s addressed by dotted paths:
//!
//! - `meta.{job_id,run_id,run_dir,start_time}`: set once at creation
//! - `inputs.<name>`: set once after input parsing
//! - `steps.<identity>.outputs.<key>`: set once, after the step succeeds
//!
//! Paths that do not start with one of those namespaces are shorthand for
//! step outputs: `build.version` reads `steps.build.outputs.version`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::core::{random_name, Outputs, Value};
use crate::job::RESERVED_IDS;

/// `${{ a.b }}` placeholders. At least one dot is required so that shell
/// variables like `${foo}` pass through untouched.
static TEMPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{\{\s*(\w+(?:\.\w+)+)\s*\}\}").expect("valid template regex")
});

const META: &str = "meta";
const INPUTS: &str = "inputs";
const STEPS: &str = "steps";
const OUTPUTS: &str = "outputs";

const META_KEYS: [&str; 4] = ["job_id", "run_id", "run_dir", "start_time"];

/// Errors raised by the run context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A path tries to descend into a scalar or a sequence.
    #[error("Variable `{path}` descends into a non-mapping value at `{segment}`")]
    NotAMapping { path: String, segment: String },

    /// A path resolves to a mapping or a sequence.
    #[error("Variable `{path}` resolves to a {kind}, not a scalar")]
    NotAScalar { path: String, kind: &'static str },

    /// A write-once entry already has a value.
    #[error("`{0}` is already set and cannot be overwritten")]
    AlreadyWritten(String),

    /// A restored context lacks run metadata.
    #[error("Checkpoint is missing `meta.{0}`")]
    MissingMeta(&'static str),

    /// A restored context has an unreadable start time.
    #[error("Checkpoint has an invalid `meta.start_time`: {0}")]
    InvalidStartTime(#[from] chrono::ParseError),

    /// Scratch directory could not be created or removed.
    #[error("Scratch directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Context could not be (de)serialized.
    #[error("Context serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The mutable state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    tree: BTreeMap<String, Value>,
    start_time: DateTime<FixedOffset>,
}

impl Context {
    /// Create a fresh context with a new run id and scratch directory.
    pub fn create(job_id: &str, scratch_root: &Path) -> Result<Self, ContextError> {
        let run_id = random_name("run");
        let run_dir = scratch_root.join(format!("slowhand_{run_id}"));
        std::fs::create_dir_all(&run_dir)
            .map_err(|source| ContextError::Io { path: run_dir.clone(), source })?;
        let start_time: DateTime<FixedOffset> = Local::now().into();

        let mut meta = BTreeMap::new();
        meta.insert("job_id".to_string(), Value::from(job_id));
        meta.insert("run_id".to_string(), Value::from(run_id.as_str()));
        meta.insert("run_dir".to_string(), Value::from(run_dir.to_string_lossy().to_string()));
        meta.insert("start_time".to_string(), Value::from(start_time.to_rfc3339()));

        let mut tree = BTreeMap::new();
        tree.insert(META.to_string(), Value::Map(meta));

        tracing::debug!(run_id = run_id, run_dir = %run_dir.display(), "Created run context");
        Ok(Self { tree, start_time })
    }

    /// Rebuild a context from `serialize()` output.
    pub fn restore(bytes: &[u8]) -> Result<Self, ContextError> {
        let tree: BTreeMap<String, Value> = serde_json::from_slice(bytes)?;

        let meta = tree.get(META).and_then(Value::as_map);
        let meta_value = |key: &str| meta.and_then(|m| m.get(key)).and_then(Value::as_str);
        for key in META_KEYS {
            if meta_value(key).is_none() {
                return Err(ContextError::MissingMeta(key));
            }
        }
        let start_time = DateTime::parse_from_rfc3339(meta_value("start_time").unwrap_or_default())?;

        Ok(Self { tree, start_time })
    }

    /// Serialize the whole tree as JSON.
    pub fn serialize(&self) -> Result<Vec<u8>, ContextError> {
        Ok(serde_json::to_vec_pretty(&self.tree)?)
    }

    /// The raw variable tree.
    pub fn tree(&self) -> &BTreeMap<String, Value> {
        &self.tree
    }

    fn meta_str(&self, key: &str) -> &str {
        self.tree
            .get(META)
            .and_then(Value::as_map)
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Identifier of the job this run belongs to.
    pub fn job_id(&self) -> &str {
        self.meta_str("job_id")
    }

    /// Identifier of this run.
    pub fn run_id(&self) -> &str {
        self.meta_str("run_id")
    }

    /// Scratch directory private to this run.
    pub fn run_dir(&self) -> &Path {
        Path::new(self.meta_str("run_dir"))
    }

    /// When the run was first started.
    pub fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time
    }

    /// Store the parsed inputs. Allowed once.
    pub fn set_inputs(&mut self, inputs: BTreeMap<String, Value>) -> Result<(), ContextError> {
        if self.tree.contains_key(INPUTS) {
            return Err(ContextError::AlreadyWritten(INPUTS.to_string()));
        }
        self.tree.insert(INPUTS.to_string(), Value::Map(inputs));
        Ok(())
    }

    /// Record a step's outputs under `steps.<identity>.outputs`. Allowed once per step.
    pub fn save_step_outputs(&mut self, identity: &str, outputs: Outputs) -> Result<(), ContextError> {
        if self.has_step_outputs(identity) {
            return Err(ContextError::AlreadyWritten(format!("{STEPS}.{identity}.{OUTPUTS}")));
        }
        tracing::debug!(step = identity, outputs = ?outputs, "Saving step outputs");

        let steps = self.tree.entry(STEPS.to_string()).or_insert_with(|| Value::Map(BTreeMap::new()));
        let Value::Map(steps) = steps else {
            return Err(ContextError::NotAMapping { path: STEPS.to_string(), segment: STEPS.to_string() });
        };
        let mut entry = BTreeMap::new();
        entry.insert(OUTPUTS.to_string(), Value::Map(outputs));
        steps.insert(identity.to_string(), Value::Map(entry));
        Ok(())
    }

    /// Whether a step already has recorded outputs.
    pub fn has_step_outputs(&self, identity: &str) -> bool {
        self.step_outputs(identity).is_some()
    }

    /// Recorded outputs of a step.
    pub fn step_outputs(&self, identity: &str) -> Option<&BTreeMap<String, Value>> {
        self.tree
            .get(STEPS)
            .and_then(Value::as_map)
            .and_then(|steps| steps.get(identity))
            .and_then(Value::as_map)
            .and_then(|step| step.get(OUTPUTS))
            .and_then(Value::as_map)
    }

    /// Identities of all steps with recorded outputs.
    pub fn completed_steps(&self) -> Vec<&str> {
        self.tree
            .get(STEPS)
            .and_then(Value::as_map)
            .map(|steps| {
                steps
                    .iter()
                    .filter(|(_, step)| {
                        step.as_map().is_some_and(|s| s.get(OUTPUTS).is_some_and(|o| o.as_map().is_some()))
                    })
                    .map(|(id, _)| id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a dotted path to its string form.
    ///
    /// Missing segments and nulls resolve to an empty string. Descending into
    /// a scalar, or ending on a mapping or sequence, is an error.
    pub fn resolve_variable(&self, path: &str) -> Result<String, ContextError> {
        let segments = expand_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return Ok(String::new());
        };

        let mut map = &self.tree;
        for segment in parents {
            match map.get(*segment) {
                None | Some(Value::Null) => return Ok(String::new()),
                Some(Value::Map(inner)) => map = inner,
                Some(_) => {
                    return Err(ContextError::NotAMapping {
                        path: path.to_string(),
                        segment: (*segment).to_string(),
                    })
                }
            }
        }

        match map.get(*last) {
            None => Ok(String::new()),
            Some(value) if value.is_scalar() => Ok(value.to_string()),
            Some(value) => Err(ContextError::NotAScalar { path: path.to_string(), kind: value.kind() }),
        }
    }

    /// Substitute every `${{ path }}` in strings, recursing into mappings and sequences.
    pub fn resolve_template(&self, value: &Value) -> Result<Value, ContextError> {
        Ok(match value {
            Value::String(s) => Value::String(self.substitute(s)?),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.resolve_template(v)?)))
                    .collect::<Result<_, ContextError>>()?,
            ),
            Value::Seq(items) => Value::Seq(
                items.iter().map(|v| self.resolve_template(v)).collect::<Result<_, _>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Resolve templates in every parameter.
    pub fn resolve_params(
        &self,
        params: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ContextError> {
        params.iter().map(|(k, v)| Ok((k.clone(), self.resolve_template(v)?))).collect()
    }

    fn substitute(&self, text: &str) -> Result<String, ContextError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in TEMPLATE.captures_iter(text) {
            let whole = whole_match(&caps);
            out.push_str(&text[last..whole.0]);
            out.push_str(&self.resolve_variable(&caps[1])?);
            last = whole.1;
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Remove the scratch directory.
    /// Recreate the scratch directory if it is gone. Returns `true` when it
    /// had to be recreated.
    pub fn ensure_run_dir(&self) -> Result<bool, ContextError> {
        let run_dir = self.run_dir();
        if run_dir.is_dir() {
            return Ok(false);
        }
        std::fs::create_dir_all(run_dir)
            .map_err(|source| ContextError::Io { path: run_dir.to_path_buf(), source })?;
        Ok(true)
    }

    pub fn teardown(&self) -> Result<(), ContextError> {
        let run_dir = self.run_dir();
        if run_dir.exists() {
            std::fs::remove_dir_all(run_dir)
                .map_err(|source| ContextError::Io { path: run_dir.to_path_buf(), source })?;
            tracing::debug!(run_dir = %run_dir.display(), "Deleted run directory");
        }
        Ok(())
    }
}

fn whole_match(caps: &Captures<'_>) -> (usize, usize) {
    caps.get(0).map_or((0, 0), |m| (m.start(), m.end()))
}

/// Expand step-output shorthand into a full path.
fn expand_path(path: &str) -> Vec<&str> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    if RESERVED_IDS.contains(&first) {
        return std::iter::once(first).chain(segments).collect();
    }
    [STEPS, first, OUTPUTS].into_iter().chain(segments).collect()
}
