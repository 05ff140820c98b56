//! Общая модель replay: схема, строки, таблица, исходящие записи,
//! ошибки и трейт sink'а.
//!
//! Крейт не зависит от tokio: sink'и возвращают boxed futures,
//! runtime выбирает вызывающая сторона.

use std::future::Future;
use std::pin::Pin;

mod error;
mod schema;
mod types;
mod util;

pub use error::{EmitError, ErrorKind, RecordError, ReplayError};
pub use schema::{Schema, normalize_column};
pub use types::{DELAY_COLUMN, DelayMode, OutboundRecord, Row, Table};
pub use util::parse_delay_ms;

// ════════════════════════════════════════════════════════════════
//  Sink Trait
// ════════════════════════════════════════════════════════════════

/// Future, возвращаемый методами [`RecordSink`].
pub type EmitFuture<'a> = Pin<Box<dyn Future<Output = Result<(), EmitError>> + Send + 'a>>;

/// Внешний append-only лог, принимающий записи replay.
///
/// Движок держит не более одного незавершённого `emit` на run, поэтому
/// реализация получает `&mut self`. Повторы при ошибках — ответственность
/// самого sink'а; движок только считает отказы.
pub trait RecordSink: Send {
    /// Имя sink'а для логирования.
    fn name(&self) -> &str;

    /// Отправить одну запись.
    fn emit<'a>(&'a mut self, record: &'a OutboundRecord) -> EmitFuture<'a>;

    /// Сбросить буферы (в конце run).
    fn flush(&mut self) -> EmitFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn emit<'a>(&'a mut self, record: &'a OutboundRecord) -> EmitFuture<'a> {
        (**self).emit(record)
    }

    fn flush(&mut self) -> EmitFuture<'_> {
        (**self).flush()
    }
}
