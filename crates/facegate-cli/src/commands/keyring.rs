use std::any::Any;
use std::process::ExitCode;

use crate::cli::{KeyringCommands, OutputMode};
use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::keyring::{self, KeyringOutcome};
use crate::output::render_keyring;

pub struct KeyringHandler {
    command: KeyringCommands,
    run: Box<dyn Fn(&KeyringCommands) -> AppResult<KeyringOutcome> + Send + Sync>,
    render: Box<dyn Fn(&KeyringOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl KeyringHandler {
    pub fn new(command: KeyringCommands) -> Self {
        Self::with_dependencies(command, keyring::run_keyring, render_keyring)
    }

    pub fn with_dependencies(
        command: KeyringCommands,
        run: impl Fn(&KeyringCommands) -> AppResult<KeyringOutcome> + Send + Sync + 'static,
        render: impl Fn(&KeyringOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            command,
            run: Box::new(run),
            render: Box::new(render),
        }
    }
}

impl CommandHandler for KeyringHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let outcome = (self.run)(&self.command)?;
        (self.render)(&outcome, mode)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
