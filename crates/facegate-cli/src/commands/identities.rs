use std::any::Any;
use std::process::ExitCode;

use crate::cli::{IdentitiesArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::engine::{self, IdentitiesReport};
use crate::errors::AppResult;
use crate::output::render_identities;

pub struct IdentitiesHandler {
    args: IdentitiesArgs,
    run: Box<dyn Fn(&IdentitiesArgs) -> AppResult<IdentitiesReport> + Send + Sync>,
    render: Box<dyn Fn(&IdentitiesReport, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl IdentitiesHandler {
    pub fn new(args: IdentitiesArgs) -> Self {
        Self::with_dependencies(args, engine::run_identities, render_identities)
    }

    pub fn with_dependencies(
        args: IdentitiesArgs,
        run: impl Fn(&IdentitiesArgs) -> AppResult<IdentitiesReport> + Send + Sync + 'static,
        render: impl Fn(&IdentitiesReport, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for IdentitiesHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let report = (self.run)(&self.args)?;
        (self.render)(&report, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
