use crate::span::Span;
use thiserror::Error;

/// Default error-count ceiling before a batch aborts.
pub const DEFAULT_MAX_ERRORS: usize = 10;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("invalid recursive type: {path}")]
    Cycle { path: String, span: Span },

    #[error("ambiguous selector '{name}'")]
    AmbiguousSelector { name: String, span: Span },

    #[error("cannot call pointer method '{name}' on non-addressable value")]
    NeedsAddress { name: String, span: Span },

    #[error("got {got} type arguments but '{name}' expects {expected}")]
    ArityMismatch { name: String, expected: usize, got: usize, span: Span },

    #[error("type error: {msg}")]
    Type { msg: String, span: Span },

    #[error("too many errors ({count})")]
    TooManyErrors { count: usize },
}

impl CompileError {
    pub fn type_err(msg: impl Into<String>, span: Span) -> Self {
        Self::Type { msg: msg.into(), span }
    }

    pub fn span(&self) -> Span {
        match self {
            CompileError::Cycle { span, .. }
            | CompileError::AmbiguousSelector { span, .. }
            | CompileError::NeedsAddress { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::Type { span, .. } => *span,
            CompileError::TooManyErrors { .. } => Span::dummy(),
        }
    }
}

/// Collects per-position diagnostics for one compilation batch.
///
/// Every recoverable failure (cycle, ambiguity, needs-address, arity
/// mismatch) is reported here and analysis continues. Internal invariant
/// violations never go through the sink; they panic.
#[derive(Debug)]
pub struct DiagnosticSink {
    errors: Vec<CompileError>,
    max_errors: usize,
}

impl DiagnosticSink {
    pub fn new(max_errors: usize) -> Self {
        Self { errors: Vec::new(), max_errors }
    }

    /// Collects an error. Collection stops at the configured ceiling;
    /// `check_limit` aborts the batch once it is reached.
    pub fn report(&mut self, err: CompileError) {
        if self.errors.len() < self.max_errors {
            self.errors.push(err);
        }
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn at_limit(&self) -> bool {
        self.errors.len() >= self.max_errors
    }

    /// Aborts the batch once the configured ceiling is reached.
    pub fn check_limit(&self) -> Result<(), CompileError> {
        if self.at_limit() {
            return Err(CompileError::TooManyErrors { count: self.errors.len() });
        }
        Ok(())
    }

    /// Returns the first collected error, if any. Used by drivers that
    /// want a `Result` out of a completed batch.
    pub fn first(&self) -> Option<&CompileError> {
        self.errors.first()
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ERRORS)
    }
}

/// Render a CompileError with ariadne for nice terminal output.
pub fn render_error(source: &str, err: &CompileError) {
    use ariadne::{Label, Report, ReportKind, Source};

    match err {
        CompileError::TooManyErrors { count } => {
            eprintln!("error: too many errors ({count}), stopping");
        }
        _ => {
            let span = err.span();
            Report::build(ReportKind::Error, (), span.start)
                .with_message("type error")
                .with_label(Label::new(span.start..span.end).with_message(err.to_string()))
                .finish()
                .eprint(Source::from(source))
                .unwrap();
        }
    }
}
