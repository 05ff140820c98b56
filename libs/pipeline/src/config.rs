use std::time::Duration;

use serde::Deserialize;

use replay_api::RecordSink;

use crate::PipelineError;
use crate::framing::Framing;
use crate::sink::{FanoutSink, TcpSink, WriterSink};

// ═══════════════════════════════════════════════════════════════
//  Sink Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Исходящее TCP соединение (host + port).
    Tcp,
    /// Файл на дозапись (path).
    File,
    Stdout,
}

/// Конфигурация одного sink'а из `[[sinks]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_name")]
    pub name: String,
    pub kind: SinkKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    /// "lines" (по умолчанию) или "length_prefixed".
    #[serde(default = "default_framing")]
    pub framing: String,
    pub framing_config: Option<toml::Value>,
    /// Оборачивать payload в `{"partition_key", "data"}`.
    #[serde(default = "default_envelope")]
    pub envelope: bool,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_sink_name() -> String {
    "unnamed".into()
}
fn default_framing() -> String {
    "lines".into()
}
fn default_envelope() -> bool {
    true
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

impl SinkConfig {
    /// Проверить обязательные поля для выбранного `kind` и разобрать framing.
    pub fn validate(&self) -> Result<Framing, PipelineError> {
        match self.kind {
            SinkKind::Tcp => {
                if self.host.as_deref().is_none_or(|h| h.trim().is_empty()) {
                    return Err(PipelineError::sink_config(&self.name, "tcp sink requires 'host'"));
                }
                if self.port.is_none_or(|p| p == 0) {
                    return Err(PipelineError::sink_config(&self.name, "tcp sink requires a non-zero 'port'"));
                }
            }
            SinkKind::File => {
                if self.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    return Err(PipelineError::sink_config(&self.name, "file sink requires 'path'"));
                }
            }
            SinkKind::Stdout => {}
        }
        Framing::from_config(&self.name, &self.framing, &self.framing_config)
    }

    /// Собрать sink. TCP соединение открывается лениво, при первой записи.
    pub async fn build(&self) -> Result<Box<dyn RecordSink>, PipelineError> {
        let framing = self.validate()?;
        let sink: Box<dyn RecordSink> = match self.kind {
            SinkKind::Tcp => {
                let host = self.host.as_deref().unwrap_or_default();
                let port = self.port.unwrap_or_default();
                Box::new(
                    TcpSink::new(&self.name, format!("{host}:{port}"), framing)
                        .with_envelope(self.envelope)
                        .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms)),
                )
            }
            SinkKind::File => {
                let path = self.path.as_deref().unwrap_or_default();
                let sink = WriterSink::file(&self.name, path, framing)
                    .await
                    .map_err(|source| PipelineError::SinkOpen {
                        sink: self.name.clone(),
                        source,
                    })?;
                Box::new(sink.with_envelope(self.envelope))
            }
            SinkKind::Stdout => Box::new(WriterSink::stdout(&self.name, framing).with_envelope(self.envelope)),
        };
        tracing::info!(sink = %self.name, kind = ?self.kind, framing = %self.framing, "sink configured");
        Ok(sink)
    }
}

/// Собрать sink'и из конфигурации: один sink как есть, несколько — fan-out.
pub async fn build_sinks(configs: &[SinkConfig]) -> Result<Box<dyn RecordSink>, PipelineError> {
    if configs.is_empty() {
        return Err(PipelineError::sink_config("-", "no [[sinks]] configured"));
    }
    let mut sinks = Vec::with_capacity(configs.len());
    for cfg in configs {
        sinks.push(cfg.build().await?);
    }
    if sinks.len() == 1 {
        if let Some(sink) = sinks.pop() {
            return Ok(sink);
        }
    }
    Ok(Box::new(FanoutSink::new(sinks)))
}
