//! `actions/abort`: stop the job with a message.

use serde::Deserialize;

use super::{decode_params, Action, ActionError};
use crate::core::{Outputs, Params};
use crate::engine::Context;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AbortParams {
    message: String,
}

/// Always fails. Usually guarded by an `if:` condition.
#[derive(Debug, Default, Clone, Copy)]
pub struct Abort;

impl Action for Abort {
    fn run(&self, params: &Params, _context: &Context, _dry_run: bool) -> Result<Outputs, ActionError> {
        let params: AbortParams = decode_params(params)?;
        Err(ActionError::Failed(format!(
            "Aborted with message:\n{}",
            textwrap::dedent(&params.message).trim()
        )))
    }
}
