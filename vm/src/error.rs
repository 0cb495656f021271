use std::fmt::{Display, Formatter};
use std::num::ParseIntError;

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Rejected engine or generator configuration.
    Config(String),
    /// A trace line that does not follow the operation grammar.
    Parse(String),
    /// A replacement policy could not pick a victim.
    Policy(String),
    Io(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(s) => write!(f, "invalid configuration: {}", s),
            Error::Parse(s) => write!(f, "malformed operation: {}", s),
            Error::Policy(s) => write!(f, "replacement policy failure: {}", s),
            Error::Io(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Self {
        Error::Parse(err.to_string())
    }
}

#[macro_export]
macro_rules! config_err {
    ($($arg:tt)*) => {
        $crate::error::Error::Config(format!($($arg)*))
    };
}
