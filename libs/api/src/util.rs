/// Разобрать значение колонки задержки.
///
/// Принимает целые (`5000`) и дробные (`5000.0`) значения, дробная часть
/// отбрасывается, отрицательные значения приводятся к нулю.
pub fn parse_delay_ms(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n.max(0) as u64);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(f.max(0.0) as u64),
        _ => None,
    }
}
