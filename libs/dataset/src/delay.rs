use chrono::{DateTime, Utc};

use replay_api::{DELAY_COLUMN, DelayMode, Row, ReplayError, Table};

use crate::parse_timestamp;

// ═══════════════════════════════════════════════════════════════
//  Delay derivation
// ═══════════════════════════════════════════════════════════════

/// Добавить колонку `time_till_next_event_ms` для replay.
///
/// - `None` — таблица возвращается без изменений.
/// - `Static(ms)` — все строки, кроме последней, получают `ms`; порядок сохраняется.
/// - `TimestampDiff(col)` — строки стабильно сортируются по времени,
///   задержка = `max(0, next - this)` в мс, у последней строки 0.
///
/// `start_time` обязателен для любого активного режима. Если колонка
/// задержки уже есть, её значения перезаписываются.
pub fn derive(
    table: Table,
    mode: &DelayMode,
    start_time: Option<DateTime<Utc>>,
) -> Result<Table, ReplayError> {
    if !mode.is_active() {
        return Ok(table);
    }

    let Some(start_time) = start_time else {
        return Err(ReplayError::Configuration(format!(
            "start time of the first event is required for delay mode {mode}"
        )));
    };
    if table.is_empty() {
        return Err(ReplayError::Configuration(format!(
            "dataset has no rows to derive delays for (mode {mode})"
        )));
    }

    let table = match mode {
        DelayMode::None => table,
        DelayMode::Static(ms) => apply_static(table, *ms)?,
        DelayMode::TimestampDiff(col) => apply_timestamp_diff(table, col)?,
    };

    tracing::info!(
        mode = %mode,
        rows = table.len(),
        start_time = %start_time,
        "derived event delays"
    );
    Ok(table)
}

fn apply_static(mut table: Table, delay_ms: u64) -> Result<Table, ReplayError> {
    let pos = table.ensure_column(DELAY_COLUMN, "0")?;
    let last = table.len() - 1;
    let delay = delay_ms.to_string();
    for i in 0..table.len() {
        let value = if i == last { "0" } else { delay.as_str() };
        table.set_cell(i, pos, value)?;
    }
    Ok(table)
}

fn apply_timestamp_diff(table: Table, column: &str) -> Result<Table, ReplayError> {
    // Колонка проверяется до парсинга значений.
    let ts_pos = table.schema().position(column)?;
    let column_name = table.schema().columns()[ts_pos].clone();

    let times = parse_column(&table, ts_pos, &column_name)?;

    let (schema, rows) = table.into_parts();
    let mut timed: Vec<(DateTime<Utc>, Row)> = times.into_iter().zip(rows).collect();
    // sort_by_key стабилен: равные timestamp'ы сохраняют исходный порядок.
    timed.sort_by_key(|(ts, _)| *ts);

    let (times, rows): (Vec<_>, Vec<_>) = timed.into_iter().unzip();
    let mut table = Table::from_rows(schema, rows)?;
    let pos = table.ensure_column(DELAY_COLUMN, "0")?;

    for (i, ts) in times.iter().enumerate() {
        let delay = match times.get(i + 1) {
            Some(next) => (*next - *ts).num_milliseconds().max(0),
            None => 0,
        };
        table.set_cell(i, pos, delay.to_string())?;
    }
    Ok(table)
}

/// Распарсить все значения колонки. Первая ошибка прерывает операцию.
pub(crate) fn parse_column(
    table: &Table,
    pos: usize,
    column_name: &str,
) -> Result<Vec<DateTime<Utc>>, ReplayError> {
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let raw = row.get(pos).unwrap_or_default();
            parse_timestamp(raw).ok_or_else(|| ReplayError::parse(i, column_name, raw))
        })
        .collect()
}
