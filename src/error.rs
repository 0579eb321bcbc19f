//! Typed failures for configuration, filesystem setup and templating.
//!
//! Network and payload errors stay in `anyhow` with context attached at the
//! call site; everything here is something the operator can fix locally.

use std::path::PathBuf;

use thiserror::Error;

/// Environment is missing something the run cannot start without.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("A personal access token is required to proceed! Set ACCESS_TOKEN.")]
    MissingCredential,

    #[error("Environment variable GITHUB_ACTOR must be set.")]
    MissingActor,
}

/// Template or output directory is not usable.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("the '{}' directory does not exist", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("the file '{}' does not exist", path.display())]
    MissingFile { path: PathBuf },

    #[error("cannot {action} '{}'", path.display())]
    Permission {
        action: &'static str,
        path: PathBuf,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SetupError {
    SetupError::Io {
        path: path.into(),
        source,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The template does not contain a token the renderer must fill.
    #[error("template '{template}' has no '{{{{ {token} }}}}' placeholder")]
    MissingPlaceholder { template: String, token: String },
}
