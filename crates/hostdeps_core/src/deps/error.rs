//! Dependents graph error types.

use crate::channel::ChannelParseError;
use crate::model::ObjectId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure reported by a dependent's callback or listener method.
#[derive(Debug)]
pub struct CallbackError {
    message: String,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Wraps an underlying error, keeping it reachable via `Error::source`.
    pub fn from_error(err: impl Error + Send + Sync + 'static) -> Self {
        Self {
            message: err.to_string(),
            cause: Some(Box::new(err)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for CallbackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for CallbackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

/// Dependents graph errors.
#[derive(Debug)]
pub enum DepsError {
    /// The channel string is malformed, or the matched variant cannot wire it.
    MalformedChannel(ChannelParseError),
    /// A dependent failed while being notified; later dependents in the
    /// same pass were not notified.
    Callback {
        source_id: ObjectId,
        channel: String,
        error: CallbackError,
    },
}

impl Display for DepsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedChannel(err) => write!(f, "malformed channel: {err}"),
            Self::Callback {
                source_id,
                channel,
                error,
            } => write!(
                f,
                "dependent callback failed for source {source_id} channel `{channel}`: {error}"
            ),
        }
    }
}

impl Error for DepsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MalformedChannel(err) => Some(err),
            Self::Callback { error, .. } => Some(error),
        }
    }
}

impl From<ChannelParseError> for DepsError {
    fn from(err: ChannelParseError) -> Self {
        Self::MalformedChannel(err)
    }
}
