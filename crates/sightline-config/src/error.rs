//! Errors from loading, saving and validating culling settings.

/// Why a `config.ron` could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config.ron: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("cannot write config.ron: {0}")]
    WriteError(#[source] std::io::Error),

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("malformed config.ron: {0}")]
    ParseError(#[source] ron::error::SpannedError),

    #[error("cannot serialize settings: {0}")]
    SerializeError(#[source] ron::Error),

    /// A setting parsed but is outside the range the pipeline accepts.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Dotted path of the offending setting, e.g. `occlusion.grouped_batch_size`.
        field: &'static str,
        /// What the setting must satisfy.
        reason: &'static str,
    },
}
