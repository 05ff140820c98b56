//! Replay движок и sink'и: таблица → записи → framing → транспорт.

pub mod config;
pub mod error;
pub mod framing;
mod replay;
pub mod sink;

pub use config::{SinkConfig, SinkKind, build_sinks};
pub use error::PipelineError;
pub use framing::{ByteOrder, Framing};
pub use replay::{FailureReason, RecordFailure, ReplayEngine, Summary, replay};
pub use sink::{FanoutSink, MemorySink, TcpSink, WriterSink};
