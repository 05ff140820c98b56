use chrono::{DateTime, Utc};

use replay_api::{Row, ReplayError, Table};

use crate::delay::parse_column;
use crate::format_timestamp;

/// Сдвинуть timestamp'ы так, чтобы самое раннее событие пришлось на `start_time`.
///
/// Интервалы между событиями сохраняются, значения переписываются
/// в каноническом формате. Порядок строк не меняется.
pub fn rebase(table: &mut Table, column: &str, start_time: DateTime<Utc>) -> Result<(), ReplayError> {
    let pos = table.schema().position(column)?;
    let column_name = table.schema().columns()[pos].clone();
    let times = parse_column(table, pos, &column_name)?;

    let Some(earliest) = times.iter().min().copied() else {
        return Ok(());
    };
    let shift = start_time - earliest;

    // Сначала сдвигаются все значения: при переполнении таблица не меняется.
    let shifted = times
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            ts.checked_add_signed(shift).ok_or_else(|| {
                let raw = table.rows().get(i).and_then(|r| r.get(pos)).unwrap_or_default();
                ReplayError::parse(i, column_name.as_str(), raw)
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (i, ts) in shifted.iter().enumerate() {
        table.set_cell(i, pos, format_timestamp(ts))?;
    }

    tracing::info!(
        column = %column_name,
        start_time = %start_time,
        shift_ms = shift.num_milliseconds(),
        "rebased timestamps"
    );
    Ok(())
}

/// Разделить датасет по `cutoff`: `(historic, new)` = `(< cutoff, >= cutoff)`.
///
/// Обе части отсортированы по времени (стабильно).
pub fn split_by_cutoff(
    table: &Table,
    column: &str,
    cutoff: DateTime<Utc>,
) -> Result<(Table, Table), ReplayError> {
    let pos = table.schema().position(column)?;
    let column_name = table.schema().columns()[pos].clone();
    let times = parse_column(table, pos, &column_name)?;

    let mut timed: Vec<(DateTime<Utc>, &Row)> = times.into_iter().zip(table.rows()).collect();
    timed.sort_by_key(|(ts, _)| *ts);

    let (historic, new): (Vec<_>, Vec<_>) = timed.into_iter().partition(|(ts, _)| *ts < cutoff);
    let historic = table.with_rows(historic.into_iter().map(|(_, r)| r.clone()).collect())?;
    let new = table.with_rows(new.into_iter().map(|(_, r)| r.clone()).collect())?;

    tracing::info!(
        column = %column_name,
        cutoff = %cutoff,
        historic = historic.len(),
        new = new.len(),
        "split dataset"
    );
    Ok((historic, new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_timestamp, read_csv};

    fn sample() -> Table {
        read_csv(
            "id,ts\n\
             b,2023-05-01 12:00:30\n\
             a,2023-05-01 12:00:00\n\
             c,2023-05-02 00:00:00\n",
        )
        .unwrap()
    }

    #[test]
    fn rebase_moves_earliest_to_start() {
        let mut table = sample();
        let start = parse_timestamp("2024-08-19 09:00:00").unwrap();
        rebase(&mut table, "ts", start).unwrap();

        let ts: Vec<_> = table.column("ts").unwrap().collect();
        assert_eq!(ts, ["2024-08-19 09:00:30", "2024-08-19 09:00:00", "2024-08-19 21:00:00"]);
    }

    #[test]
    fn rebase_rejects_bad_values() {
        let mut table = read_csv("ts\n2024-01-01\nnope\n").unwrap();
        let start = parse_timestamp("2024-08-19").unwrap();
        let err = rebase(&mut table, "ts", start).unwrap_err();
        assert!(matches!(err, ReplayError::Parse { row: 1, .. }));
    }

    #[test]
    fn rebase_out_of_range_is_a_parse_error() {
        let mut table = read_csv("ts\n-260000-01-01 00:00:00\n+260000-01-01 00:00:00\n").unwrap();
        let before = table.clone();
        let start = parse_timestamp("2024-01-01").unwrap();

        match rebase(&mut table, "ts", start) {
            Err(ReplayError::Parse { row, column, value }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "ts");
                assert_eq!(value, "+260000-01-01 00:00:00");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(table, before);
    }

    #[test]
    fn split_partitions_on_cutoff() {
        let table = sample();
        let cutoff = parse_timestamp("2023-05-01 12:00:30").unwrap();
        let (historic, new) = split_by_cutoff(&table, "ts", cutoff).unwrap();

        let h: Vec<_> = historic.column("id").unwrap().collect();
        let n: Vec<_> = new.column("id").unwrap().collect();
        assert_eq!(h, ["a"]);
        assert_eq!(n, ["b", "c"]);
        assert_eq!(historic.schema(), table.schema());
    }

    #[test]
    fn split_requires_column() {
        let cutoff = parse_timestamp("2023-05-01").unwrap();
        assert!(matches!(
            split_by_cutoff(&sample(), "when", cutoff),
            Err(ReplayError::Schema { .. })
        ));
    }
}
