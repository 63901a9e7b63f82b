//! Filter compilation errors
//!
//! Every failure is terminal for the filter being compiled. Nothing here is
//! retried or downgraded to "no filter".

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unknown entity: {entity}")]
    UnknownEntity { entity: String },

    #[error("Unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("Unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    #[error("Operator '{operator}' is not supported for '{field}' ({kind})")]
    UnsupportedOperator {
        field: String,
        operator: String,
        kind: String,
    },

    #[error("Invalid value for '{field}' with operator '{operator}': expected {expected}")]
    ValueKindMismatch {
        field: String,
        operator: String,
        expected: String,
    },

    #[error("Malformed '{operator}' operator: {reason}")]
    MalformedLogicalOperator { operator: String, reason: String },

    #[error("Malformed filter: {0}")]
    MalformedFilter(String),

    #[error("Ambiguous entity detection, candidates: {}", .candidates.join(", "))]
    AmbiguousEntityDetection { candidates: Vec<String> },

    #[error("Condition resolution failed: {0}")]
    ConditionResolution(String),

    #[error("Filter too complex: {0}")]
    FilterTooComplex(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Entity '{0}' is already registered")]
    DuplicateEntity(String),

    #[error("Invalid metadata for '{entity}': {reason}")]
    InvalidMetadata { entity: String, reason: String },
}

impl FilterError {
    pub fn unknown_entity(entity: impl Into<String>) -> Self {
        Self::UnknownEntity {
            entity: entity.into(),
        }
    }

    pub fn unknown_field(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            entity: entity.into(),
            field: field.into(),
        }
    }

    pub fn unknown_relation(entity: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::UnknownRelation {
            entity: entity.into(),
            relation: relation.into(),
        }
    }

    pub fn value_mismatch(
        field: impl Into<String>,
        operator: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::ValueKindMismatch {
            field: field.into(),
            operator: operator.into(),
            expected: expected.into(),
        }
    }

    pub fn malformed_logical(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedLogicalOperator {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_metadata(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownEntity { .. } => "UNKNOWN_ENTITY",
            Self::UnknownField { .. } => "UNKNOWN_FIELD",
            Self::UnknownRelation { .. } => "UNKNOWN_RELATION",
            Self::UnsupportedOperator { .. } => "UNSUPPORTED_OPERATOR",
            Self::ValueKindMismatch { .. } => "VALUE_KIND_MISMATCH",
            Self::MalformedLogicalOperator { .. } => "MALFORMED_LOGICAL_OPERATOR",
            Self::MalformedFilter(_) => "MALFORMED_FILTER",
            Self::AmbiguousEntityDetection { .. } => "AMBIGUOUS_ENTITY_DETECTION",
            Self::ConditionResolution(_) => "CONDITION_RESOLUTION_ERROR",
            Self::FilterTooComplex(_) => "FILTER_TOO_COMPLEX",
            Self::InvalidPagination(_) => "INVALID_PAGINATION",
            Self::DuplicateEntity(_) => "DUPLICATE_ENTITY",
            Self::InvalidMetadata { .. } => "INVALID_METADATA",
        }
    }

    /// True when the caller sent a bad filter (4xx), false when the
    /// registry or the compiler itself is at fault (5xx)
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::UnknownEntity { .. }
                | Self::ConditionResolution(_)
                | Self::DuplicateEntity(_)
                | Self::InvalidMetadata { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_field_display() {
        let err = FilterError::unknown_field("card", "colour");
        assert_eq!(err.to_string(), "Unknown field 'colour' on entity 'card'");
        assert_eq!(err.code(), "UNKNOWN_FIELD");
    }

    #[test]
    fn test_ambiguous_display_lists_candidates() {
        let err = FilterError::AmbiguousEntityDetection {
            candidates: vec!["card_users_stats".into(), "summary_card_users".into()],
        };
        assert_eq!(
            err.to_string(),
            "Ambiguous entity detection, candidates: card_users_stats, summary_card_users"
        );
    }

    #[test]
    fn test_value_mismatch_display() {
        let err = FilterError::value_mismatch("rank", "eq", "one of ASS, S, A");
        assert_eq!(
            err.to_string(),
            "Invalid value for 'rank' with operator 'eq': expected one of ASS, S, A"
        );
    }

    #[test]
    fn test_client_vs_server_errors() {
        assert!(FilterError::unknown_field("card", "x").is_client_error());
        assert!(FilterError::malformed_logical("and", "expects a list").is_client_error());
        assert!(!FilterError::unknown_entity("ghost").is_client_error());
        assert!(!FilterError::ConditionResolution("missing alias".into()).is_client_error());
        assert!(!FilterError::invalid_metadata("card", "no primary key").is_client_error());
    }
}
