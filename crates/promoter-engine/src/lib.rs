//! Runs the external promote command on behalf of the controller and the
//! `promote` subcommand.

mod error;
mod process;

pub use error::{EngineError, Result};
pub use process::{build_args, CommandEngine};
