use std::any::Any;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

/// Exit status for a completed request whose answer was "no".
pub const EXIT_REJECTED: u8 = 4;
/// Exit status when registration found the name already taken.
pub const EXIT_ALREADY_EXISTS: u8 = 5;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod authenticate;
mod doctor;
mod identities;
mod keyring;
mod register;
mod token;

pub use authenticate::AuthenticateHandler;
pub use doctor::DoctorHandler;
pub use identities::IdentitiesHandler;
pub use keyring::KeyringHandler;
pub use register::RegisterHandler;
pub use token::TokenHandler;

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Register(args) => Box::new(RegisterHandler::new(args)),
            Commands::Authenticate(args) => Box::new(AuthenticateHandler::new(args)),
            Commands::Identities(args) => Box::new(IdentitiesHandler::new(args)),
            Commands::Token(cmd) => Box::new(TokenHandler::new(cmd)),
            Commands::Keyring(cmd) => Box::new(KeyringHandler::new(cmd)),
            Commands::Doctor => Box::new(DoctorHandler::new()),
        }
    }
}
