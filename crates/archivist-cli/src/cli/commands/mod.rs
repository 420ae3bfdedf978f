//! CLI command handlers, one file per command.

mod checkpoint;
mod completions;
mod date;
mod login;
mod run;
mod seed;

pub use checkpoint::run_checkpoint;
pub use completions::run_completions;
pub use date::run_date;
pub use login::run_login;
pub use run::{run_archive, RunOptions};
pub use seed::run_seed;
