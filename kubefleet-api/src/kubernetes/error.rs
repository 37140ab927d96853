//! Remote API failures and their translation into the kubefleet error taxonomy

use kubefleet_common::{Error, ResourceRef};
use thiserror::Error as ThisError;

/// Failure reported by a cluster's API (or by the transport reaching it)
#[derive(Debug, Clone, ThisError)]
pub enum RemoteError {
    /// Connection refused, TLS failure, DNS, broken stream
    #[error("transport error: {0}")]
    Transport(String),

    /// No answer before the deadline
    #[error("request timed out")]
    Timeout,

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The API server answered with a failure status
    #[error("API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    /// The response could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn api(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError::Api {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::api(404, "NotFound", message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::api(409, "AlreadyExists", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::api(409, "Conflict", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::api(403, "Forbidden", message)
    }
}

impl From<kube::Error> for RemoteError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => RemoteError::Api {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            kube::Error::HyperError(e) => RemoteError::Transport(e.to_string()),
            kube::Error::Service(e) => {
                let text = e.to_string();
                if text.to_ascii_lowercase().contains("timed out") {
                    RemoteError::Timeout
                } else {
                    RemoteError::Transport(text)
                }
            }
            kube::Error::SerdeError(e) => RemoteError::Decode(e.to_string()),
            other => RemoteError::Transport(other.to_string()),
        }
    }
}

/// The verb being translated; 409 means different things on create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::List => "list",
            Verb::Get => "get",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }
}

/// Map a remote failure to the error returned to callers
///
/// Only identifiers from `target` and the server's own message end up in the
/// result; credentials are never part of either.
pub fn translate(err: RemoteError, verb: Verb, target: &ResourceRef) -> Error {
    match err {
        RemoteError::Transport(msg) => Error::Unavailable(format!("{}: {}", target, msg)),
        RemoteError::Timeout => Error::Unavailable(format!("{}: deadline exceeded", target)),
        RemoteError::Cancelled => Error::Unavailable(format!("{}: cancelled by caller", target)),
        RemoteError::Api { code, reason, message } => match code {
            401 | 403 => Error::PermissionDenied(format!("{}: {}", target, message)),
            404 => Error::NotFound(target.to_string()),
            409 if verb == Verb::Create => Error::AlreadyExists(target.to_string()),
            409 => Error::Conflict(format!("{}: {}", target, message)),
            429 | 500 | 502 | 503 | 504 => {
                Error::Unavailable(format!("{}: {} {}", target, code, message))
            }
            _ => Error::Unknown(format!("{}: {} {}: {}", target, code, reason, message)),
        },
        RemoteError::Decode(msg) => Error::Unknown(format!("{}: {}", target, msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubefleet_common::ResourceKind;

    fn target() -> ResourceRef {
        ResourceRef::object("c1", ResourceKind::Deployment, "web", "frontend")
    }

    #[test]
    fn test_not_found_maps_for_every_verb() {
        for verb in [Verb::Get, Verb::Update, Verb::Delete] {
            let err = translate(RemoteError::not_found("gone"), verb, &target());
            assert_eq!(err, Error::NotFound("c1/Deployment/web/frontend".to_string()));
        }
    }

    #[test]
    fn test_409_depends_on_verb() {
        let create = translate(RemoteError::already_exists("dup"), Verb::Create, &target());
        assert!(matches!(create, Error::AlreadyExists(_)));

        let update = translate(RemoteError::conflict("stale"), Verb::Update, &target());
        assert!(matches!(update, Error::Conflict(_)));
    }

    #[test]
    fn test_authorization_and_transport() {
        let denied = translate(RemoteError::forbidden("no"), Verb::List, &target());
        assert!(matches!(denied, Error::PermissionDenied(_)));

        let unauthorized = translate(RemoteError::api(401, "Unauthorized", "token"), Verb::Get, &target());
        assert!(matches!(unauthorized, Error::PermissionDenied(_)));

        let down = translate(RemoteError::Transport("connection refused".into()), Verb::Get, &target());
        assert!(matches!(down, Error::Unavailable(_)));

        let slow = translate(RemoteError::Timeout, Verb::List, &target());
        assert!(matches!(slow, Error::Unavailable(_)));
    }

    #[test]
    fn test_everything_else_is_unknown_with_message() {
        let err = translate(RemoteError::api(422, "Invalid", "spec.replicas: must be >= 0"), Verb::Update, &target());
        match err {
            Error::Unknown(msg) => assert!(msg.contains("spec.replicas")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
