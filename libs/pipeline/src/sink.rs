use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use replay_api::{EmitError, EmitFuture, OutboundRecord, RecordSink};

use crate::framing::Framing;

/// Сериализовать запись для wire: envelope `{"partition_key", "data"}`
/// или только payload.
fn encode_record(record: &OutboundRecord, envelope: bool) -> Result<Vec<u8>, EmitError> {
    if envelope {
        Ok(serde_json::to_vec(record)?)
    } else {
        Ok(record.encode_payload()?)
    }
}

// ═══════════════════════════════════════════════════════════════
//  TCP sink — lazy connect + one reconnect on send error
// ═══════════════════════════════════════════════════════════════

pub struct TcpSink {
    name: String,
    addr: String,
    framing: Framing,
    envelope: bool,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    buf: Vec<u8>,
}

impl TcpSink {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, framing: Framing) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            framing,
            envelope: true,
            connect_timeout: Duration::from_secs(5),
            stream: None,
            buf: Vec::with_capacity(8192),
        }
    }

    pub fn with_envelope(mut self, envelope: bool) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn ensure_connected(&mut self) -> Result<&mut TcpStream, EmitError> {
        if self.stream.is_none() {
            let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| EmitError::io(format!("[{}] connect to {} timed out", self.name, self.addr)))??;
            stream.set_nodelay(true)?;
            let peer: Option<SocketAddr> = stream.peer_addr().ok();
            tracing::info!(sink = %self.name, peer = ?peer, "connected");
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| EmitError::io(format!("[{}] not connected", self.name)))
    }

    async fn write_buf(&mut self) -> Result<(), EmitError> {
        let buf = std::mem::take(&mut self.buf);
        let result = async {
            let stream = self.ensure_connected().await?;
            stream.write_all(&buf).await?;
            Ok::<_, EmitError>(())
        }
        .await;
        self.buf = buf;
        result
    }

    async fn send(&mut self, record: &OutboundRecord) -> Result<(), EmitError> {
        let data = encode_record(record, self.envelope)?;
        self.buf.clear();
        self.framing.encode(&data, &mut self.buf)?;

        match self.write_buf().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == replay_api::ErrorKind::Io => {
                tracing::warn!(sink = %self.name, error = ?e, "send error, reconnecting");
                self.stream = None;
                self.write_buf().await
            }
            Err(e) => Err(e),
        }
    }
}

impl RecordSink for TcpSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit<'a>(&'a mut self, record: &'a OutboundRecord) -> EmitFuture<'a> {
        Box::pin(self.send(record))
    }

    fn flush(&mut self) -> EmitFuture<'_> {
        Box::pin(async move {
            if let Some(stream) = self.stream.as_mut() {
                stream.flush().await?;
            }
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Writer sink — file (append) or stdout, framed
// ═══════════════════════════════════════════════════════════════

pub struct WriterSink {
    name: String,
    framing: Framing,
    envelope: bool,
    out: Box<dyn AsyncWrite + Send + Unpin>,
    buf: Vec<u8>,
}

impl WriterSink {
    /// Открыть (или создать) файл на дозапись.
    pub async fn file(name: impl Into<String>, path: impl Into<PathBuf>, framing: Framing) -> std::io::Result<Self> {
        let path = path.into();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let name = name.into();
        tracing::info!(sink = %name, path = %path.display(), "file sink opened");
        Ok(Self::from_writer(name, Box::new(file), framing))
    }

    pub fn stdout(name: impl Into<String>, framing: Framing) -> Self {
        Self::from_writer(name.into(), Box::new(tokio::io::stdout()), framing)
    }

    pub fn from_writer(name: impl Into<String>, out: Box<dyn AsyncWrite + Send + Unpin>, framing: Framing) -> Self {
        Self {
            name: name.into(),
            framing,
            envelope: true,
            out,
            buf: Vec::with_capacity(4096),
        }
    }

    pub fn with_envelope(mut self, envelope: bool) -> Self {
        self.envelope = envelope;
        self
    }
}

impl RecordSink for WriterSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit<'a>(&'a mut self, record: &'a OutboundRecord) -> EmitFuture<'a> {
        Box::pin(async move {
            let data = encode_record(record, self.envelope)?;
            self.buf.clear();
            self.framing.encode(&data, &mut self.buf)?;
            self.out.write_all(&self.buf).await?;
            self.out.flush().await?;
            Ok(())
        })
    }

    fn flush(&mut self) -> EmitFuture<'_> {
        Box::pin(async move {
            self.out.flush().await?;
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Memory sink
// ═══════════════════════════════════════════════════════════════

/// Sink, сохраняющий записи в памяти вместе с моментом отправки.
#[derive(Default)]
pub struct MemorySink {
    records: Vec<OutboundRecord>,
    emitted_at: Vec<Instant>,
    flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[OutboundRecord] {
        &self.records
    }

    pub fn emitted_at(&self) -> &[Instant] {
        &self.emitted_at
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn emit<'a>(&'a mut self, record: &'a OutboundRecord) -> EmitFuture<'a> {
        self.records.push(record.clone());
        self.emitted_at.push(Instant::now());
        Box::pin(async { Ok(()) })
    }

    fn flush(&mut self) -> EmitFuture<'_> {
        self.flushes += 1;
        Box::pin(async { Ok(()) })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Fan-out
// ═══════════════════════════════════════════════════════════════

/// Отправляет каждую запись во все вложенные sink'и по очереди.
///
/// Запись считается отправленной, только если её приняли все sink'и;
/// иначе возвращается первая ошибка (остальные sink'и всё равно получают запись).
pub struct FanoutSink {
    name: String,
    sinks: Vec<Box<dyn RecordSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn RecordSink>>) -> Self {
        let name = sinks.iter().map(|s| s.name()).collect::<Vec<_>>().join("+");
        Self { name, sinks }
    }
}

impl RecordSink for FanoutSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn emit<'a>(&'a mut self, record: &'a OutboundRecord) -> EmitFuture<'a> {
        Box::pin(async move {
            let mut first_err = None;
            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.emit(record).await {
                    tracing::warn!(sink = %sink.name(), index = record.index, error = ?e, "emit failed");
                    first_err.get_or_insert(e);
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }

    fn flush(&mut self) -> EmitFuture<'_> {
        Box::pin(async move {
            let mut first_err = None;
            for sink in self.sinks.iter_mut() {
                if let Err(e) = sink.flush().await {
                    first_err.get_or_insert(e);
                }
            }
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_api::{Row, Schema};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn record(index: usize, key: &str, amount: &str) -> OutboundRecord {
        let schema = Schema::new(["user_id", "amount"]).unwrap();
        let row = Row::new(vec![key.to_string(), amount.to_string()]);
        OutboundRecord::from_row(&schema, &row, index).unwrap()
    }

    #[tokio::test]
    async fn writer_sink_writes_ndjson_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");

        let mut sink = WriterSink::file("file", &path, Framing::Lines).await.unwrap();
        sink.emit(&record(0, "u1", "5")).await.unwrap();
        sink.emit(&record(1, "u2", "7")).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"partition_key":"u1","data":{"user_id":"u1","amount":"5"}}"#);
    }

    #[tokio::test]
    async fn writer_sink_payload_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");

        let mut sink = WriterSink::file("file", &path, Framing::Lines)
            .await
            .unwrap()
            .with_envelope(false);
        sink.emit(&record(0, "u1", "5")).await.unwrap();
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\"user_id\":\"u1\",\"amount\":\"5\"}\n");
    }

    #[tokio::test]
    async fn tcp_sink_connects_lazily_and_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut out = Vec::new();
            socket.read_to_end(&mut out).await.unwrap();
            out
        });

        let framing = Framing::LengthPrefixed {
            length_bytes: 4,
            byte_order: crate::framing::ByteOrder::Big,
        };
        let mut sink = TcpSink::new("tcp", addr, framing).with_envelope(false);
        sink.emit(&record(0, "u1", "5")).await.unwrap();
        sink.flush().await.unwrap();
        drop(sink);

        let bytes = reader.await.unwrap();
        let body = b"{\"user_id\":\"u1\",\"amount\":\"5\"}";
        assert_eq!(&bytes[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&bytes[4..], body);
    }

    #[tokio::test]
    async fn tcp_sink_reports_connect_failure() {
        // Порт освобождается сразу после bind: соединение будет отклонено.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut sink = TcpSink::new("tcp", addr, Framing::Lines)
            .with_connect_timeout(Duration::from_millis(500));
        let err = sink.emit(&record(0, "u1", "5")).await.unwrap_err();
        assert_eq!(err.kind(), replay_api::ErrorKind::Io);
    }

    #[tokio::test]
    async fn fanout_delivers_to_every_sink() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.ndjson");
        let b = dir.path().join("b.ndjson");

        let sinks: Vec<Box<dyn RecordSink>> = vec![
            Box::new(WriterSink::file("a", &a, Framing::Lines).await.unwrap()),
            Box::new(WriterSink::file("b", &b, Framing::Lines).await.unwrap()),
        ];
        let mut fanout = FanoutSink::new(sinks);
        assert_eq!(fanout.name(), "a+b");
        fanout.emit(&record(0, "u1", "5")).await.unwrap();
        fanout.flush().await.unwrap();
        drop(fanout);

        assert_eq!(std::fs::read_to_string(a).unwrap().lines().count(), 1);
        assert_eq!(std::fs::read_to_string(b).unwrap().lines().count(), 1);
    }
}
