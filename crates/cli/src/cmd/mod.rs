mod plan;
mod run;

pub use plan::cmd_plan;
pub use run::{RunOptions, cmd_run};
