use core_typeahead::TypeaheadError;
use thiserror::Error;

/// Failures surfaced by the input pipeline.
///
/// Recovery happens before the error propagates: overflow and recursion
/// flush the affected buffers first, so the caller only has to report.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("typeahead buffer overflow; pending input dropped")]
    TypeaheadOverflow,
    #[error("recursive mapping")]
    RecursiveMapping,
    #[error("malformed command mapping: {0}")]
    MalformedCmdMapping(String),
    #[error("script files nested too deep")]
    ScriptDepth,
    #[error("expression mapping failed: {0}")]
    ExprFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<TypeaheadError> for InputError {
    fn from(e: TypeaheadError) -> Self {
        match e {
            TypeaheadError::Overflow => InputError::TypeaheadOverflow,
        }
    }
}
