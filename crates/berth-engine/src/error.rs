//! Engine error taxonomy.
//!
//! [`EngineError::from_engine`] is the single place where engine-native
//! failures are classified. Nothing above the engine client ever looks at a
//! `bollard` error.

use std::fmt;

use bollard::errors::Error as BollardError;
use thiserror::Error;

/// Lifecycle verb an engine call was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineVerb {
    /// Connectivity check.
    Ping,
    /// List containers.
    List,
    /// Create a container.
    Create,
    /// Inspect a container.
    Inspect,
    /// Update a container's resources.
    Update,
    /// Start a container.
    Start,
    /// Stop a container.
    Stop,
    /// Restart a container.
    Restart,
    /// Remove a container.
    Remove,
}

impl fmt::Display for EngineVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Ping => "ping",
            Self::List => "list",
            Self::Create => "create",
            Self::Inspect => "inspect",
            Self::Update => "update",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Remove => "remove",
        };
        f.write_str(verb)
    }
}

/// What an engine call was addressing, used to phrase typed errors.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// The engine itself.
    Engine,
    /// An existing container, by ID or name.
    Container(&'a str),
    /// An image, by ID or reference.
    Image(&'a str),
    /// A container being created.
    NewContainer {
        /// Requested name.
        name: &'a str,
        /// Requested image reference.
        image: &'a str,
    },
}

/// Errors surfaced by the engine client.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// No container with that identity exists.
    #[error("no such container: {id}")]
    NotFound {
        /// Identity that was looked up.
        id: String,
    },

    /// The requested name is taken.
    #[error("container name {name:?} is already in use")]
    DuplicateName {
        /// Conflicting name.
        name: String,
    },

    /// The image reference does not resolve on the engine.
    #[error("image not found: {image}")]
    ImageNotFound {
        /// Unresolved image reference.
        image: String,
    },

    /// The engine cannot be reached.
    #[error("container engine unavailable: {cause}")]
    Unavailable {
        /// Underlying connection failure.
        cause: String,
    },

    /// Any other engine-side failure.
    #[error("engine {verb} failed: {cause}")]
    OperationFailed {
        /// Verb that failed.
        verb: EngineVerb,
        /// Underlying cause.
        cause: String,
    },
}

impl EngineError {
    /// Classifies an engine-native failure.
    #[must_use]
    pub fn from_engine(verb: EngineVerb, subject: Subject<'_>, err: &BollardError) -> Self {
        if let BollardError::DockerResponseServerError {
            status_code,
            message,
        } = err
        {
            return match (*status_code, subject) {
                (404, Subject::NewContainer { image, .. }) if names_missing_image(message) => {
                    Self::ImageNotFound {
                        image: image.to_owned(),
                    }
                }
                (404, Subject::Container(id)) => Self::NotFound { id: id.to_owned() },
                (404, Subject::Image(image)) => Self::ImageNotFound {
                    image: image.to_owned(),
                },
                (409, Subject::NewContainer { name, .. }) => Self::DuplicateName {
                    name: name.to_owned(),
                },
                _ => Self::OperationFailed {
                    verb,
                    cause: format!("{message} (status {status_code})"),
                },
            };
        }
        if is_connection_failure(err) {
            return Self::Unavailable {
                cause: err.to_string(),
            };
        }
        Self::OperationFailed {
            verb,
            cause: err.to_string(),
        }
    }
}

/// A create can also 404 on a missing network, so only the engine's own
/// wording identifies a missing image.
fn names_missing_image(message: &str) -> bool {
    message.to_ascii_lowercase().contains("no such image")
}

fn is_connection_failure(err: &BollardError) -> bool {
    if matches!(err, BollardError::IOError { .. }) {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.downcast_ref::<std::io::Error>().is_some() {
            return true;
        }
        source = inner.source();
    }
    false
}
