// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for the warden authorization engine

use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;

/// An error that can be generated within the authorization engine
///
/// Errors fall into two families with deliberately different treatment.
/// Errors affecting a single boolean decision (`is_granted`, `is_managed`,
/// `is_field_granted`) are recovered to a deny locally and never cross that
/// boundary.  Errors affecting configuration integrity or administrative
/// enumeration are surfaced to the caller, since hiding them would silently
/// misreport the system's access model.
///
/// General best practices for error design apply here.  Where possible, we
/// want to reuse existing variants rather than inventing new ones to
/// distinguish cases that no programmatic consumer needs to distinguish.
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// The subject argument of a check was malformed or untyped.  Recovered
    /// to a deny at the decision boundary; surfaced from administrative
    /// operations.
    #[error("invalid subject: {message}")]
    InvalidSubject { message: String },
    /// A permission configuration was requested for a type that has none
    /// registered.
    #[error("no permission configuration registered for type \"{type_name}\"")]
    ConfigNotFound { type_name: String },
    /// Role-permission enumeration found a configuration-declared operation
    /// with no resolvable permission record.  This signals a
    /// configuration/data inconsistency that requires operator attention.
    #[error(
        "no permission record found for operation \"{operation}\" \
         on type \"{type_name}\""
    )]
    PermissionNotFound { operation: String, type_name: String },
    /// Two sharing identity configurations declared the same alias.
    #[error("sharing identity alias \"{alias}\" is already registered")]
    AlreadyExistingAlias { alias: String },
    /// A master association is configured for this type but could not be
    /// resolved, either on the instance or through the provider.
    #[error(
        "master association \"{path}\" of type \"{type_name}\" \
         cannot be resolved"
    )]
    MasterUnresolvable { type_name: String, path: String },

    /// A provider collaborator is (perhaps transiently) unavailable.
    #[error("Service Unavailable: {internal_message}")]
    ServiceUnavailable { internal_message: String },
    /// The engine encountered an unhandled operational error.
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
}

impl Error {
    /// Returns whether the error is likely transient and could reasonably be
    /// retried
    pub fn retryable(&self) -> bool {
        match self {
            Error::ServiceUnavailable { .. } => true,

            Error::InvalidSubject { .. }
            | Error::ConfigNotFound { .. }
            | Error::PermissionNotFound { .. }
            | Error::AlreadyExistingAlias { .. }
            | Error::MasterUnresolvable { .. }
            | Error::InternalError { .. } => false,
        }
    }

    /// Generates an [`Error::InvalidSubject`] error with the specific message
    pub fn invalid_subject(message: &str) -> Error {
        Error::InvalidSubject { message: message.to_owned() }
    }

    /// Generates an [`Error::InternalError`] error with the specific message
    ///
    /// InternalError should be used for operational conditions that should
    /// not happen but that we cannot reasonably handle at runtime (e.g., a
    /// provider returning two configurations for the same type).
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError { internal_message: internal_message.to_owned() }
    }

    /// Generates an [`Error::ServiceUnavailable`] error with the specific
    /// message
    ///
    /// This should be used for transient provider failures where the caller
    /// might be expected to retry.  Logic errors or other problems indicating
    /// that a retry would not work should probably be an InternalError
    /// instead.
    pub fn unavail(message: &str) -> Error {
        Error::ServiceUnavailable { internal_message: message.to_owned() }
    }

    /// Given an [`Error`] with an internal message, return the same error
    /// with `context` prepended to it to provide more context
    ///
    /// If the error has no internal message, then it is returned unchanged.
    pub fn internal_context<C>(self, context: C) -> Error
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Error::InvalidSubject { .. }
            | Error::ConfigNotFound { .. }
            | Error::PermissionNotFound { .. }
            | Error::AlreadyExistingAlias { .. }
            | Error::MasterUnresolvable { .. } => self,
            Error::ServiceUnavailable { internal_message } => {
                Error::ServiceUnavailable {
                    internal_message: format!(
                        "{}: {}",
                        context, internal_message
                    ),
                }
            }
            Error::InternalError { internal_message } => Error::InternalError {
                internal_message: format!("{}: {}", context, internal_message),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn test_internal_context() {
        let error = Error::unavail("no route to role store");
        assert_eq!(
            error.internal_context("loading grants"),
            Error::ServiceUnavailable {
                internal_message: String::from(
                    "loading grants: no route to role store"
                ),
            }
        );

        // Caller-facing variants pass through unchanged.
        let error = Error::ConfigNotFound { type_name: String::from("Item") };
        assert_eq!(error.clone().internal_context("lookup"), error);
    }

    #[test]
    fn test_retryable() {
        assert!(Error::unavail("backend down").retryable());
        assert!(!Error::invalid_subject("no type").retryable());
        assert!(!Error::internal_error("bug").retryable());
    }
}
