//! Errors raised while building a schema or converting stored content.

use crate::blocks::BlockClass;
use crate::catalog::ModelId;
use crate::registry::Classification;
use snafu::Snafu;
use std::fmt::Display;
use std::path::PathBuf;

/// Errors encountered while building or serving a CMS schema.
///
/// The variants fall in three groups:
/// * configuration errors, which can only be raised while the schema is being built and abort
///   construction
/// * data errors, raised while converting stored content which does not match the schema built
///   from the same model definitions
/// * lookup errors, raised when a registry entry is requested which was never registered
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("snippet {model} should already be registered"))]
    UnregisteredSnippet { model: ModelId },

    #[snafu(display(
        "custom block {class} has a non-scalar target and needs an explicit converter"
    ))]
    CustomTargetWithoutConverter { class: BlockClass },

    #[snafu(display("custom block {class} cannot target a {target} block"))]
    UnsupportedCustomTarget {
        class: BlockClass,
        target: &'static str,
    },

    #[snafu(display("type name {name} is used by both {existing} and {requested}"))]
    NameCollision {
        name: String,
        existing: String,
        requested: String,
    },

    #[snafu(display(
        "model {model} is already registered as {existing}, cannot register it as {requested}"
    ))]
    Reclassified {
        model: ModelId,
        existing: Classification,
        requested: Classification,
    },

    #[snafu(display("unknown {kind} {key}"))]
    NotFound { kind: &'static str, key: String },

    #[snafu(display("unknown block type {block_type} in stream field {field}"))]
    UnknownBlockType { field: String, block_type: String },

    #[snafu(display("malformed block in stream field {field}: {error}"))]
    MalformedBlock { field: String, error: String },

    #[snafu(display("error building GraphQL schema: {error}"))]
    Schema { error: String },

    #[snafu(display("error reading settings from {}: {source}", path.display()))]
    ReadSettings {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("error parsing settings: {source}"))]
    ParseSettings { source: serde_json::Error },
}

impl Error {
    /// A registry lookup which found nothing.
    pub fn not_found(kind: &'static str, key: impl Display) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// A stored block which could not be decoded.
    pub fn malformed(field: impl Into<String>, error: impl Display) -> Self {
        Self::MalformedBlock {
            field: field.into(),
            error: error.to_string(),
        }
    }

    /// Is this an error in the stored content, as opposed to the schema configuration?
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownBlockType { .. } | Self::MalformedBlock { .. }
        )
    }
}

/// Result type for fallible operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
