use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use replay_api::{
    DELAY_COLUMN, EmitError, OutboundRecord, RecordError, RecordSink, ReplayError, Table, parse_delay_ms,
};

// ═══════════════════════════════════════════════════════════════
//  Summary
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureReason {
    #[error("{0}")]
    Record(#[from] RecordError),
    #[error("{0}")]
    Emit(#[from] EmitError),
}

/// Строка, которую не удалось отправить.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub index: usize,
    pub reason: FailureReason,
}

/// Итог одного replay run.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub rows_seen: usize,
    pub emitted: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
    pub elapsed: Duration,
    /// Run прерван через [`CancellationToken`] до последней строки.
    pub cancelled: bool,
}

impl Summary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

// ═══════════════════════════════════════════════════════════════
//  Replay Engine
// ═══════════════════════════════════════════════════════════════

/// Воспроизводит таблицу в sink в реальном темпе.
///
/// Строки отправляются строго по порядку, между строкой `i` и `i+1`
/// движок ждёт значение колонки задержки строки `i`. После последней
/// строки ожидания нет. Ошибки отдельных строк не прерывают run.
///
/// Движок не хранит состояния между run'ами: несколько run'ов могут
/// идти параллельно, каждый со своим sink'ом.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    cancel: CancellationToken,
    progress_every: usize,
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl ReplayEngine {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress_every: 500,
        }
    }

    /// Как часто логировать прогресс (в строках). 0 отключает.
    pub fn with_progress_every(mut self, rows: usize) -> Self {
        self.progress_every = rows;
        self
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Отправить все строки таблицы в `sink`.
    ///
    /// Все значения задержки проверяются до первой отправки: нечисловое
    /// значение — `ReplayError::Parse`, и ни одна запись не уходит.
    pub async fn run<S: RecordSink + ?Sized>(&self, table: &Table, sink: &mut S) -> Result<Summary, ReplayError> {
        let started = Instant::now();
        let mut summary = Summary::default();

        if table.is_empty() {
            tracing::info!(sink = %sink.name(), "dataset is empty, nothing to replay");
            return Ok(summary);
        }

        let delays = plan_delays(table)?;
        let last = table.len() - 1;

        tracing::info!(
            sink = %sink.name(),
            rows = table.len(),
            paced = delays.is_some(),
            "replay started"
        );

        for (i, row) in table.rows().iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.rows_seen += 1;

            let result = match OutboundRecord::from_row(table.schema(), row, i) {
                Ok(record) => sink.emit(&record).await.map_err(FailureReason::from),
                Err(e) => Err(FailureReason::from(e)),
            };
            match result {
                Ok(()) => summary.emitted += 1,
                Err(reason) => {
                    tracing::warn!(sink = %sink.name(), index = i, error = %reason, "record failed");
                    summary.failed += 1;
                    summary.failures.push(RecordFailure { index: i, reason });
                }
            }

            if self.progress_every > 0 && summary.rows_seen % self.progress_every == 0 {
                tracing::info!(
                    sink = %sink.name(),
                    rows = summary.rows_seen,
                    emitted = summary.emitted,
                    failed = summary.failed,
                    "replay progress"
                );
            }

            let delay = delays.as_ref().and_then(|d| d.get(i).copied()).unwrap_or(0);
            if i < last && delay > 0 {
                tracing::debug!(index = i, delay_ms = delay, "waiting for next event");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    _ = self.cancel.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                }
            }
        }

        if let Err(e) = sink.flush().await {
            tracing::warn!(sink = %sink.name(), error = ?e, "flush failed");
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            sink = %sink.name(),
            rows = summary.rows_seen,
            emitted = summary.emitted,
            failed = summary.failed,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "replay finished"
        );
        Ok(summary)
    }
}

/// Отправить таблицу без возможности отмены.
pub async fn replay<S: RecordSink + ?Sized>(table: &Table, sink: &mut S) -> Result<Summary, ReplayError> {
    ReplayEngine::default().run(table, sink).await
}

/// Разобрать колонку задержки целиком. `None` — колонки нет, строки
/// отправляются подряд.
fn plan_delays(table: &Table) -> Result<Option<Vec<u64>>, ReplayError> {
    if table.schema().first() == Some(DELAY_COLUMN) {
        return Err(ReplayError::Table(format!(
            "'{DELAY_COLUMN}' cannot be the first column: it is used as the partition key"
        )));
    }
    let Some(pos) = table.schema().get(DELAY_COLUMN) else {
        return Ok(None);
    };
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let raw = row.get(pos).unwrap_or_default();
            parse_delay_ms(raw).ok_or_else(|| ReplayError::parse(i, DELAY_COLUMN, raw))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use dataset::{derive, read_csv};
    use replay_api::{DelayMode, EmitFuture, ErrorKind};

    fn table(csv: &str) -> Table {
        read_csv(csv).unwrap()
    }

    fn gaps(sink: &MemorySink) -> Vec<u128> {
        sink.emitted_at()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis())
            .collect()
    }

    /// Sink, отклоняющий записи с заданными индексами.
    struct FlakySink {
        inner: MemorySink,
        reject: Vec<usize>,
        /// Индексы всех вызовов `emit`, включая отклонённые.
        calls: Vec<usize>,
    }

    impl RecordSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn emit<'a>(&'a mut self, record: &'a OutboundRecord) -> EmitFuture<'a> {
            self.calls.push(record.index);
            if self.reject.contains(&record.index) {
                return Box::pin(async { Err(EmitError::rejected("throttled")) });
            }
            self.inner.emit(record)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_rows_but_not_after_last() {
        let t = table(
            "user_id,amount,time_till_next_event_ms\n\
             u1,5,5000\n\
             u2,7,7000\n\
             u3,9,0\n",
        );
        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();

        assert_eq!(summary.emitted, 3);
        assert_eq!(summary.failed, 0);
        assert!(!summary.cancelled);
        assert_eq!(gaps(&sink), [5000, 7000]);
        assert!(summary.elapsed >= Duration::from_millis(12_000));
        assert!(summary.elapsed < Duration::from_millis(13_000));
        assert_eq!(sink.flushes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn trailing_delay_is_ignored() {
        let t = table("id,time_till_next_event_ms\na,100\nb,60000\n");
        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();
        assert_eq!(summary.elapsed, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn static_delay_paces_rows() {
        let start = dataset::parse_timestamp("2024-01-01 00:00:00");
        let t = derive(table("id,v\na,1\nb,2\nc,3\n"), &DelayMode::Static(1000), start).unwrap();
        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();

        assert_eq!(summary.emitted, 3);
        assert!(summary.elapsed >= Duration::from_millis(2000));
        assert_eq!(gaps(&sink), [1000, 1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn table_without_delay_column_is_sent_back_to_back() {
        let t = table("id,v\na,1\nb,2\n");
        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();
        assert_eq!(summary.emitted, 2);
        assert_eq!(summary.elapsed, Duration::ZERO);
    }

    #[tokio::test]
    async fn empty_table_makes_no_calls() {
        let t = table("id,v\n");
        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();
        assert_eq!(summary.rows_seen, 0);
        assert_eq!(summary.emitted, 0);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn records_are_emitted_in_table_order() {
        let t = table(
            "user_id,amount,time_till_next_event_ms\n\
             u1,5,0\n\
             u2,7,0\n\
             u3,9,0\n",
        );
        let mut sink = MemorySink::new();
        replay(&t, &mut sink).await.unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 3);
        let keys: Vec<_> = records.iter().map(|r| r.partition_key.as_str()).collect();
        assert_eq!(keys, ["u1", "u2", "u3"]);
        assert_eq!(
            records[0].payload,
            serde_json::json!({"user_id": "u1", "amount": "5"})
        );
        assert!(records.iter().all(|r| r.payload.get(DELAY_COLUMN).is_none()));
    }

    #[tokio::test]
    async fn emit_failures_do_not_stop_the_run() {
        let t = table("id\na\nb\nc\nd\n");
        let mut sink = FlakySink {
            inner: MemorySink::new(),
            reject: vec![1, 2],
            calls: Vec::new(),
        };
        let summary = replay(&t, &mut sink).await.unwrap();

        assert_eq!(summary.rows_seen, 4);
        assert_eq!(summary.emitted, 2);
        assert_eq!(summary.failed, 2);
        let failed: Vec<_> = summary.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, [1, 2]);
        assert!(matches!(
            &summary.failures[0].reason,
            FailureReason::Emit(e) if e.kind() == ErrorKind::Rejected
        ));
        let keys: Vec<_> = sink.inner.records().iter().map(|r| r.partition_key.as_str()).collect();
        assert_eq!(keys, ["a", "d"]);
        assert_eq!(sink.calls, [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn empty_partition_key_is_a_record_failure() {
        let t = table("user_id,amount\nu1,5\n  ,7\nu3,9\n");
        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();

        assert_eq!(summary.emitted, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.failures[0],
            RecordFailure {
                index: 1,
                reason: FailureReason::Record(RecordError::PartitionKey {
                    column: "user_id".into()
                }),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_wait_returns_partial_summary() {
        let t = table(
            "id,time_till_next_event_ms\n\
             a,1000\n\
             b,60000\n\
             c,0\n",
        );
        let token = CancellationToken::new();
        let engine = ReplayEngine::new(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5000)).await;
            token.cancel();
        });

        let mut sink = MemorySink::new();
        let summary = engine.run(&t, &mut sink).await.unwrap();
        canceller.await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.emitted, 2);
        assert_eq!(summary.rows_seen, 2);
        assert!(summary.elapsed < Duration::from_millis(60_000));
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn cancelled_before_start_emits_nothing() {
        let t = table("id\na\nb\n");
        let engine = ReplayEngine::default();
        engine.cancel_token().cancel();

        let mut sink = MemorySink::new();
        let summary = engine.run(&t, &mut sink).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.rows_seen, 0);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn bad_delay_value_fails_before_first_emit() {
        let t = table(
            "id,time_till_next_event_ms\n\
             a,10\n\
             b,soon\n\
             c,0\n",
        );
        let mut sink = MemorySink::new();
        match replay(&t, &mut sink).await {
            Err(ReplayError::Parse { row, column, value }) => {
                assert_eq!(row, 1);
                assert_eq!(column, DELAY_COLUMN);
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(sink.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fractional_and_negative_delays_are_accepted() {
        let t = table("id,time_till_next_event_ms\na,1500.0\nb,-20\nc,0\n");
        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();
        assert_eq!(summary.emitted, 3);
        assert_eq!(gaps(&sink), [1500, 0]);
    }

    #[tokio::test]
    async fn delay_column_cannot_be_partition_key() {
        let t = table("time_till_next_event_ms,id\n0,a\n");
        let mut sink = MemorySink::new();
        let err = replay(&t, &mut sink).await.unwrap_err();
        assert!(matches!(err, ReplayError::Table(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_runs_are_independent() {
        let a = table("id,time_till_next_event_ms\na1,1000\na2,0\n");
        let b = table("id,time_till_next_event_ms\nb1,3000\nb2,0\n");
        let engine = ReplayEngine::default();

        let mut sink_a = MemorySink::new();
        let mut sink_b = MemorySink::new();
        let (ra, rb) = tokio::join!(engine.run(&a, &mut sink_a), engine.run(&b, &mut sink_b));

        assert_eq!(ra.unwrap().emitted, 2);
        assert_eq!(rb.unwrap().emitted, 2);
        assert_eq!(gaps(&sink_a), [1000]);
        assert_eq!(gaps(&sink_b), [3000]);
        assert_eq!(sink_a.records()[0].partition_key, "a1");
        assert_eq!(sink_b.records()[1].partition_key, "b2");
    }

    #[tokio::test(start_paused = true)]
    async fn derived_timestamps_drive_wall_clock_gaps() {
        let start = dataset::parse_timestamp("2024-01-01 10:00:00");
        let t = derive(
            table(
                "user_id,ts\n\
                 u2,2024-01-01 10:00:05\n\
                 u1,2024-01-01 10:00:00\n\
                 u3,2024-01-01 10:00:12\n",
            ),
            &DelayMode::TimestampDiff("ts".into()),
            start,
        )
        .unwrap();

        let mut sink = MemorySink::new();
        let summary = replay(&t, &mut sink).await.unwrap();
        assert_eq!(summary.emitted, 3);
        assert_eq!(sink.records()[0].partition_key, "u1");
        assert_eq!(gaps(&sink), [5000, 7000]);
    }
}
