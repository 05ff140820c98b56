use serde::Deserialize;

use replay_api::EmitError;

use crate::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[serde(alias = "be")]
    Big,
    #[serde(alias = "le")]
    Little,
}

/// Определение границ сообщений в исходящем потоке байтов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Одна запись на строку, `\n` в конце.
    Lines,
    /// Заголовок длины (1, 2 или 4 байта) + payload.
    LengthPrefixed { length_bytes: usize, byte_order: ByteOrder },
}

#[derive(Deserialize)]
#[serde(default)]
struct LengthPrefixedConfig {
    /// Размер заголовка длины в байтах: 1, 2 или 4 (по умолчанию 4).
    length_bytes: usize,
    /// Порядок байтов: "big" (по умолчанию) или "little".
    byte_order: ByteOrder,
}

impl Default for LengthPrefixedConfig {
    fn default() -> Self {
        Self {
            length_bytes: 4,
            byte_order: ByteOrder::Big,
        }
    }
}

impl Framing {
    /// Собрать framing по имени и опциональному конфигу из TOML.
    pub fn from_config(sink: &str, name: &str, config: &Option<toml::Value>) -> Result<Self, PipelineError> {
        match name {
            "lines" => Ok(Framing::Lines),
            "length_prefixed" | "length-prefixed" => {
                let cfg: LengthPrefixedConfig = match config {
                    Some(v) => v
                        .clone()
                        .try_into()
                        .map_err(|e| PipelineError::sink_config(sink, format!("framing_config: {e}")))?,
                    None => LengthPrefixedConfig::default(),
                };
                if !matches!(cfg.length_bytes, 1 | 2 | 4) {
                    return Err(PipelineError::sink_config(
                        sink,
                        format!("length_bytes must be 1, 2, or 4, got {}", cfg.length_bytes),
                    ));
                }
                Ok(Framing::LengthPrefixed {
                    length_bytes: cfg.length_bytes,
                    byte_order: cfg.byte_order,
                })
            }
            other => Err(PipelineError::sink_config(
                sink,
                format!("unknown framing {other:?} (expected \"lines\" or \"length_prefixed\")"),
            )),
        }
    }

    /// Добавить framed данные в выходной буфер.
    pub fn encode(&self, data: &[u8], buf: &mut Vec<u8>) -> Result<(), EmitError> {
        match *self {
            Framing::Lines => {
                if data.contains(&b'\n') {
                    return Err(EmitError::format_err("payload contains a newline, cannot use lines framing"));
                }
                buf.extend_from_slice(data);
                buf.push(b'\n');
            }
            Framing::LengthPrefixed { length_bytes, byte_order } => {
                let len = data.len();
                match (length_bytes, byte_order) {
                    (1, _) => {
                        if len > u8::MAX as usize {
                            return Err(EmitError::format_err(format!("payload too large for 1-byte header: {len}")));
                        }
                        buf.push(len as u8);
                    }
                    (2, _) => {
                        if len > u16::MAX as usize {
                            return Err(EmitError::format_err(format!("payload too large for 2-byte header: {len}")));
                        }
                        let len = len as u16;
                        match byte_order {
                            ByteOrder::Big => buf.extend_from_slice(&len.to_be_bytes()),
                            ByteOrder::Little => buf.extend_from_slice(&len.to_le_bytes()),
                        }
                    }
                    (4, _) => {
                        if len > u32::MAX as usize {
                            return Err(EmitError::format_err(format!("payload too large for 4-byte header: {len}")));
                        }
                        let len = len as u32;
                        match byte_order {
                            ByteOrder::Big => buf.extend_from_slice(&len.to_be_bytes()),
                            ByteOrder::Little => buf.extend_from_slice(&len.to_le_bytes()),
                        }
                    }
                    (n, _) => return Err(EmitError::config(format!("unsupported length_bytes: {n}"))),
                }
                buf.extend_from_slice(data);
            }
        }
        Ok(())
    }
}
