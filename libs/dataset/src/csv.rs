use std::path::Path;

use replay_api::{Row, Schema, Table};

use crate::DatasetError;

const DELIMITER: char = ',';

// ═══════════════════════════════════════════════════════════════
//  RFC 4180 record parser
// ═══════════════════════════════════════════════════════════════

/// Разбирает текст на записи с учётом quoting (RFC 4180).
///
/// Поле в кавычках может содержать разделитель и перевод строки.
/// Пустые строки пропускаются. Для каждой записи возвращается номер
/// строки файла, с которой она начинается (1-based).
pub(crate) fn parse_records(text: &str, delimiter: char) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    loop {
        while let Some(&c) = chars.peek() {
            if c != '\r' && c != '\n' {
                break;
            }
            chars.next();
            if c == '\n' {
                line += 1;
            }
        }
        if chars.peek().is_none() {
            break;
        }

        let start_line = line;
        let mut fields = Vec::new();
        let mut field = String::new();

        loop {
            if chars.peek() == Some(&'"') {
                chars.next(); // consume opening quote
                loop {
                    match chars.next() {
                        Some('"') => {
                            if chars.peek() == Some(&'"') {
                                // Escaped quote: "" → "
                                chars.next();
                                field.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            field.push(c);
                        }
                        None => break, // EOF inside quote — best effort
                    }
                }
                // skip trailing chars after closing quote
                while let Some(&c) = chars.peek() {
                    if c == delimiter || c == '\r' || c == '\n' {
                        break;
                    }
                    chars.next();
                }
            } else {
                while let Some(&c) = chars.peek() {
                    if c == delimiter || c == '\r' || c == '\n' {
                        break;
                    }
                    field.push(c);
                    chars.next();
                }
            }

            fields.push(std::mem::take(&mut field));

            match chars.next() {
                Some(c) if c == delimiter => continue,
                Some('\r') => {
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    line += 1;
                    break;
                }
                Some('\n') => {
                    line += 1;
                    break;
                }
                _ => break,
            }
        }

        records.push((start_line, fields));
    }

    records
}

/// Экранировать поле, если оно содержит разделитель, кавычку или перевод строки.
fn push_field(out: &mut String, value: &str, delimiter: char) {
    if value.contains(delimiter) || value.contains('"') || value.contains('\n') || value.contains('\r') {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a String>, delimiter: char) {
    for (i, value) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        push_field(out, value, delimiter);
    }
    out.push('\n');
}

// ═══════════════════════════════════════════════════════════════
//  Table ↔ CSV
// ═══════════════════════════════════════════════════════════════

/// Разобрать CSV (строка заголовка + строки данных) в таблицу.
///
/// Имена колонок нормализуются (lower case). Строка с числом полей,
/// отличным от заголовка, — ошибка `Ragged`.
pub fn read_csv(text: &str) -> Result<Table, DatasetError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = parse_records(text, DELIMITER).into_iter();

    let (_, header) = records.next().ok_or(DatasetError::Empty)?;
    let schema = Schema::new(&header)?;
    let mut table = Table::new(schema);

    for (line, fields) in records {
        if fields.len() != header.len() {
            return Err(DatasetError::Ragged {
                line,
                expected: header.len(),
                found: fields.len(),
            });
        }
        table.push_row(Row::new(fields))?;
    }

    Ok(table)
}

/// Прочитать CSV файл целиком и разобрать в таблицу.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Table, DatasetError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let table = read_csv(&text)?;
    tracing::info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.schema().len(),
        "loaded dataset"
    );
    Ok(table)
}

/// Сериализовать таблицу в CSV (заголовок + строки, `\n`).
pub fn write_csv(table: &Table) -> String {
    let mut out = String::new();
    push_record(&mut out, table.schema().columns(), DELIMITER);
    for row in table.rows() {
        push_record(&mut out, row.values(), DELIMITER);
    }
    out
}

/// Записать таблицу в CSV файл.
pub fn save_csv(table: &Table, path: impl AsRef<Path>) -> Result<(), DatasetError> {
    let path = path.as_ref();
    std::fs::write(path, write_csv(table)).map_err(|source| DatasetError::Write {
        path: path.display().to_string(),
        source,
    })?;
    tracing::info!(path = %path.display(), rows = table.len(), "saved dataset");
    Ok(())
}
