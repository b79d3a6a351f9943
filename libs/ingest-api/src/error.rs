use crate::batch::FailureReason;

/// What went wrong in a sender or dead-letter store, as far as delivery
/// is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings; the same batch would fail again.
    Config,
    /// Network, disk or timeout trouble. The only kind worth a retry.
    Io,
    /// The records themselves are unacceptable.
    Format,
    /// Broken protocol or invalid state.
    Logic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Format => "format",
            ErrorKind::Logic => "logic",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ════════════════════════════════════════════════════════════════
//  SinkError
// ════════════════════════════════════════════════════════════════

/// Error returned by `BatchSender` and `DeadLetterSink` implementations.
///
/// `Display` is the bare message (it ends up in dead-letter envelopes),
/// `Debug` prefixes the kind.
#[derive(Clone)]
pub struct SinkError {
    kind: ErrorKind,
    message: String,
}

impl SinkError {
    fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Io, msg)
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Format, msg)
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Logic, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Io
    }

    /// Где окажется батч, если отправка упала с этой ошибкой.
    /// `None` для транспортных ошибок: они ещё ретраятся.
    pub fn dead_letter_reason(&self) -> Option<FailureReason> {
        match self.kind {
            ErrorKind::Io => None,
            ErrorKind::Format => Some(FailureReason::Validation),
            ErrorKind::Config | ErrorKind::Logic => Some(FailureReason::NonRetryable),
        }
    }

    /// Prefix the message with context, keeping the kind.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self { message: format!("{ctx}: {}", self.message), ..self }
    }
}

impl std::fmt::Debug for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        Self::format_err(e.to_string())
    }
}
