pub mod prepare;
pub mod split;
pub mod stream;

use replay_api::Table;

use crate::config::Effective;
use crate::error::SimError;

/// Загрузить датасет, при необходимости сделать rebase и вычислить задержки.
pub(crate) fn load_and_derive(eff: &Effective) -> Result<Table, SimError> {
    let mode = eff.delay_mode()?;
    let mut table = dataset::load_csv(&eff.filepath)?;

    if eff.rebase {
        let start = eff.start_time.ok_or_else(|| SimError::Config {
            context: "dataset",
            detail: "rebase requires first_event_dt".into(),
        })?;
        dataset::rebase(&mut table, eff.timestamp_column()?, start)?;
    }

    Ok(dataset::derive(table, &mode, eff.start_time)?)
}
