use std::any::Any;
use std::process::ExitCode;

use crate::cli::{AuthenticateArgs, OutputMode};
use crate::commands::{CommandHandler, EXIT_REJECTED};
use crate::engine::{self, AuthenticateReport};
use crate::errors::AppResult;
use crate::output::render_authenticate;

pub struct AuthenticateHandler {
    args: AuthenticateArgs,
    run: Box<dyn Fn(&AuthenticateArgs) -> AppResult<AuthenticateReport> + Send + Sync>,
    render: Box<dyn Fn(&AuthenticateReport, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl AuthenticateHandler {
    pub fn new(args: AuthenticateArgs) -> Self {
        Self::with_dependencies(args, engine::run_authenticate, render_authenticate)
    }

    pub fn with_dependencies(
        args: AuthenticateArgs,
        run: impl Fn(&AuthenticateArgs) -> AppResult<AuthenticateReport> + Send + Sync + 'static,
        render: impl Fn(&AuthenticateReport, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            args,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for AuthenticateHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let report = (self.run)(&self.args)?;
        (self.render)(&report, mode)?;
        let exit = if report.outcome.is_accepted() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_REJECTED)
        };
        Ok(exit)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
