use std::any::Any;
use std::process::ExitCode;

use crate::cli::{OutputMode, RegisterArgs};
use crate::commands::{CommandHandler, EXIT_ALREADY_EXISTS};
use crate::engine::{self, RegisterReport};
use crate::errors::AppResult;
use crate::output::render_register;

pub struct RegisterHandler {
    args: RegisterArgs,
    run: Box<dyn Fn(&RegisterArgs) -> AppResult<RegisterReport> + Send + Sync>,
    render: Box<dyn Fn(&RegisterReport, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl RegisterHandler {
    pub fn new(args: RegisterArgs) -> Self {
        Self::with_dependencies(args, engine::run_register, render_register)
    }

    pub fn with_dependencies(
        args: RegisterArgs,
        run: impl Fn(&RegisterArgs) -> AppResult<RegisterReport> + Send + Sync + 'static,
        render: impl Fn(&RegisterReport, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for RegisterHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let report = (self.run)(&self.args)?;
        (self.render)(&report, mode)?;
        let exit = if report.outcome.is_created() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_ALREADY_EXISTS)
        };
        Ok(exit)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
