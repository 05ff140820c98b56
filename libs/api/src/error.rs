// ════════════════════════════════════════════════════════════════
//  Fatal errors
// ════════════════════════════════════════════════════════════════

/// Фатальные ошибки подготовки и запуска replay.
///
/// Любая из них прерывает run до первой отправки в sink.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// Не хватает параметра для выбранного режима задержки.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Колонка отсутствует в схеме датасета.
    #[error("column '{column}' not found in dataset schema")]
    Schema { column: String },

    /// Значение в строке не удалось распарсить.
    #[error("row {row}: cannot parse {column} value {value:?}")]
    Parse { row: usize, column: String, value: String },

    /// Нарушен инвариант таблицы (ширина строки, дубли колонок).
    #[error("table: {0}")]
    Table(String),
}

impl ReplayError {
    pub fn schema(column: impl Into<String>) -> Self {
        Self::Schema { column: column.into() }
    }

    pub fn parse(row: usize, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Parse {
            row,
            column: column.into(),
            value: value.into(),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Per-record errors
// ════════════════════════════════════════════════════════════════

/// Ошибка построения исходящей записи из строки. Не фатальна для run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("partition key column '{column}' is empty")]
    PartitionKey { column: String },
}

/// Category of a sink error. Allows the caller to decide what an elevated
/// failure rate means (reconnect, skip, abort).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid sink configuration — permanent.
    Config,
    /// I/O or network error — transient, may reconnect.
    Io,
    /// Record could not be encoded for the wire.
    Format,
    /// Sink explicitly refused the record.
    Rejected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Rejected => f.write_str("rejected"),
        }
    }
}

/// Error returned by [`crate::RecordSink::emit`].
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// `From` impls assign the kind automatically so sinks can use `?`.
#[derive(Clone, PartialEq, Eq)]
pub struct EmitError {
    kind: ErrorKind,
    message: String,
}

impl EmitError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Rejected, message: msg.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for EmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for EmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for EmitError {}

impl From<std::io::Error> for EmitError {
    fn from(e: std::io::Error) -> Self { Self { kind: ErrorKind::Io, message: e.to_string() } }
}

impl From<serde_json::Error> for EmitError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}
