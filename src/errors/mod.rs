mod bot_error;
mod exec_error;

pub use bot_error::{BotError, BotErrorKind};
pub use exec_error::ExecError;
