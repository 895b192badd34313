#![allow(clippy::vec_init_then_push)]
#![allow(clippy::needless_collect)]
#![allow(clippy::format_push_string)]
#![allow(clippy::unused_self)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::unnecessary_filter_map)]
#![allow(clippy::unnecessary_lazy_evaluations)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::manual_strip)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::single_char_pattern)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::or_fun_call)]
#![allow(clippy::case_sensitive_file_extension_comparisons)]
#![allow(clippy::should_implement_trait)]

//! # Slowhand
//!
//! A declarative job runner.
//!
//! Jobs are YAML files listing steps. Each step runs a shell script or a
//! named action, may be guarded by an `if:` condition, and can publish
//! outputs that later steps reference with `${{ step.key }}` templates. A
//! failed run leaves a checkpoint behind; resuming it skips every step that
//! already recorded outputs.
//!
//! ## Example
//!
//! ```yaml
//! name: Release
//! inputs:
//!   version:
//!     required: true
//! steps:
//!   - id: bump
//!     name: Bump
//!     uses: actions/compute-version
//!     with:
//!       input: ${{ inputs.version }}
//!       add-patch: 1
//!   - name: Tag
//!     if: bump.result != ""
//!     run: git tag "v${{ bump.result }}"
//! ```
//!
//! ```bash
//! slowhand run release -i version=1.4.2
//! slowhand resume release
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::unnecessary_literal_bound)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::redundant_clone)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::unnecessary_debug_formatting)]
#![allow(clippy::for_kv_map)]
#![allow(clippy::use_self)]
#![allow(clippy::ptr_arg)]

pub mod actions;
pub mod core;
pub mod engine;
pub mod error;
pub mod expression;
pub mod job;

// Re-export commonly used types
pub use actions::{Action, ActionError, ActionRegistry};
pub use core::{Config, Outputs, Params, Value};
pub use engine::{Context, RunOptions, RunOutcome, RunReport, Runner};
pub use error::{Error, Result};
pub use expression::{Condition, ExpressionError};
pub use job::{Job, JobError, Step};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "slowhand";
