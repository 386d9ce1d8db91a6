//! Engine error taxonomy.

/// Top-level error type for macropulse.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("missing upstream field {reference}")]
    MissingUpstreamField { reference: String },

    #[error("domain {domain} read undeclared upstream field {reference}")]
    UndeclaredUpstream { domain: String, reference: String },

    #[error("schema validation failed for {domain}: {}", errors.join("; "))]
    SchemaValidation { domain: String, errors: Vec<String> },

    #[error("computation error in {domain}: {reason}")]
    Computation { domain: String, reason: String },

    #[error("dataset integrity error: {reason}")]
    DatasetIntegrity { reason: String },

    #[error("dataset has no column {column}")]
    MissingColumn { column: String },

    #[error("invalid pipeline order: {reason}")]
    PipelineOrder { reason: String },

    #[error("result for {domain} was already recorded")]
    DuplicateResult { domain: String },

    #[error("invalid reference path {path:?} (expected <domain>.<field>)")]
    InvalidReference { path: String },

    #[error("weights for {signal} sum to {sum}, expected 1")]
    InvalidWeights { signal: String, sum: f64 },

    #[error("persistence error: {reason}")]
    Persistence { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn computation(domain: &str, reason: impl Into<String>) -> Self {
        EngineError::Computation {
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl std::fmt::Display) -> Self {
        EngineError::Persistence {
            reason: reason.to_string(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::Persistence { .. } | EngineError::Serialization(_) => 3,
            EngineError::DatasetIntegrity { .. } | EngineError::MissingColumn { .. } => 4,
            EngineError::MissingUpstreamField { .. }
            | EngineError::UndeclaredUpstream { .. }
            | EngineError::SchemaValidation { .. }
            | EngineError::Computation { .. }
            | EngineError::PipelineOrder { .. }
            | EngineError::DuplicateResult { .. }
            | EngineError::InvalidReference { .. }
            | EngineError::InvalidWeights { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_validation_joins_errors() {
        let err = EngineError::SchemaValidation {
            domain: "gli".into(),
            errors: vec!["missing total".into(), "bad length".into()],
        };
        assert_eq!(
            err.to_string(),
            "schema validation failed for gli: missing total; bad length"
        );
    }

    #[test]
    fn computation_helper_sets_domain() {
        let err = EngineError::computation("us_system", "empty series");
        assert_eq!(err.to_string(), "computation error in us_system: empty series");
    }

    #[test]
    fn config_errors_display() {
        let err = EngineError::ConfigMissing {
            section: "input".into(),
            key: "path".into(),
        };
        assert_eq!(err.to_string(), "missing config key [input] path");
    }
}
