//! definition of the general error type of the cyclic exchange

use std::sync::Arc;
use core::fmt;

/**
    general object reporting an unexpected result regarding the master, its domains or the bus exchange

    Its variant are meant to help finding the cause responsible for the problem and how to deal with it.
    None of them is recovered automatically: the caller decides whether to retry or abort.
*/
#[derive(Clone, Debug)]
pub enum EthercatError {
    /// error caused by communication support
    ///
    /// these errors are exterior to this library
    Io(Arc<std::io::Error>),

    /// no master (or no domain handle) where one is required
    ///
    /// these errors are fixed by requesting the master first, or by releasing the master held by an other user
    Unavailable(&'static str),

    /// a domain with this name is already registered
    DuplicateName(String),

    /// the named domain or the addressed slave does not exist
    NotFound(String),

    /// the fieldbus master or the registry could not allocate a new domain
    ///
    /// nothing has been kept from the failed allocation
    AllocationFailed(&'static str),

    /// malformed caller input
    InvalidArgument(&'static str),

    /// the fieldbus master reported a failure on receive, send or activation
    ///
    /// inside the cyclic exchange these errors concern the current cycle only
    Bus(&'static str),
}

/// convenient alias to simplify return annotations
pub type EthercatResult<T=()> = core::result::Result<T, EthercatError>;

impl EthercatError {
    /// true for errors reported by the bus itself rather than by the registry or the caller
    pub fn is_bus(&self) -> bool {
        matches!(self, Self::Bus(_) | Self::Io(_))
    }
}

impl fmt::Display for EthercatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (src, msg) : (&str, String) = match self {
            Self::Io(value) => ("Io", value.to_string()),
            Self::Unavailable(value) => ("Unavailable", value.to_string()),
            Self::DuplicateName(name) => ("DuplicateName", format!("domain {:?} already exists", name)),
            Self::NotFound(what) => ("NotFound", format!("{} not found", what)),
            Self::AllocationFailed(value) => ("AllocationFailed", value.to_string()),
            Self::InvalidArgument(value) => ("InvalidArgument", value.to_string()),
            Self::Bus(value) => ("Bus", value.to_string()),
        };

        f.debug_struct("EthercatError")
            .field("source", &src)
            .field("message", &msg)
            .finish()
    }
}

impl std::error::Error for EthercatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EthercatError {
    fn from(src: std::io::Error) -> Self {
        EthercatError::Io(Arc::new(src))
    }
}
