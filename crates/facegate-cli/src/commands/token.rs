use std::any::Any;
use std::process::ExitCode;

use crate::cli::{OutputMode, TokenCommands};
use crate::commands::CommandHandler;
use crate::engine::{self, TokenReport};
use crate::errors::AppResult;
use crate::output::render_token_verify;

pub struct TokenHandler {
    command: TokenCommands,
    run: Box<dyn Fn(&TokenCommands) -> AppResult<TokenReport> + Send + Sync>,
    render: Box<dyn Fn(&TokenReport, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl TokenHandler {
    pub fn new(command: TokenCommands) -> Self {
        Self::with_dependencies(command, default_run, render_token_verify)
    }

    pub fn with_dependencies(
        command: TokenCommands,
        run: impl Fn(&TokenCommands) -> AppResult<TokenReport> + Send + Sync + 'static,
        render: impl Fn(&TokenReport, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            command,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for TokenHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let report = (self.run)(&self.command)?;
        (self.render)(&report, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn default_run(command: &TokenCommands) -> AppResult<TokenReport> {
    match command {
        TokenCommands::Verify(args) => engine::run_token_verify(args),
    }
}
