//! Error types for model loading and code generation

use thiserror::Error;

/// Errors raised while loading a model or compiling it to FORTRAN code
///
/// Domain-level problems (malformed input, references to entities that do
/// not exist, constraint systems that cannot be closed) are reported through
/// this enum. Inconsistencies that a successful construction scan rules out,
/// such as a dependency key with no registry entry, are defects and panic
/// instead.
#[derive(Error, Debug)]
pub enum CompilerError {
    // ─────────────────────────────────────────────────────────────────────
    // Input errors
    // ─────────────────────────────────────────────────────────────────────
    /// The model document could not be read
    #[error("cannot read model document: {0}")]
    UnreadableInput(#[from] serde_json::Error),

    /// An expression node cannot be translated to FORTRAN
    #[error("unsupported expression: {detail}")]
    UnsupportedExpression { detail: String },

    /// A call names neither a reserved nor a user-defined function
    #[error("call to undefined function `{name}`")]
    FunctionNotFound { name: String },

    /// A reference names no entity of the model
    #[error("unknown model entity `{id}`")]
    UnknownModelEntity { id: String },

    // ─────────────────────────────────────────────────────────────────────
    // Model closure errors
    // ─────────────────────────────────────────────────────────────────────
    /// Volatile quantities remain without a defining equation
    #[error("no defining equation for: {}", ids.join(", "))]
    UndefinedVolatile { ids: Vec<String> },

    /// An algebraic constraint has no variable left to determine
    #[error("algebraic constraint system cannot be satisfied")]
    AlgebraicConstraint,

    /// A control variable uses a discretization the backend cannot emit
    #[error("unsupported discretization for control `{id}`")]
    UnsupportedControl { id: String },

    // ─────────────────────────────────────────────────────────────────────
    // Experiment setup errors
    // ─────────────────────────────────────────────────────────────────────
    /// A calibration-parameter mark is not a valid identifier
    #[error("invalid calibration parameter name `{name}`")]
    InvalidParameterName { name: String },

    /// A calibration-parameter mark collides with an entity or another mark
    #[error("calibration parameter name `{name}` is already in use")]
    DuplicateParameterName { name: String },

    /// The registry was already compiled and can no longer be cloned
    #[error("binding registry is frozen after compilation")]
    FrozenBindings,
}

impl CompilerError {
    /// Create an UnsupportedExpression error
    pub fn unsupported(detail: impl Into<String>) -> Self {
        CompilerError::UnsupportedExpression {
            detail: detail.into(),
        }
    }

    /// Create a FunctionNotFound error
    pub fn function_not_found(name: impl Into<String>) -> Self {
        CompilerError::FunctionNotFound { name: name.into() }
    }

    /// Create an UnknownModelEntity error
    pub fn unknown_entity(id: impl Into<String>) -> Self {
        CompilerError::UnknownModelEntity { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompilerError::function_not_found("michaelis");
        assert_eq!(err.to_string(), "call to undefined function `michaelis`");

        let err = CompilerError::UndefinedVolatile {
            ids: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(err.to_string(), "no defining equation for: A, B");
    }
}
