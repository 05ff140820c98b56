use std::path::Path;

use crate::config::{Effective, SplitArgs};
use crate::error::SimError;

pub async fn run(args: SplitArgs) -> Result<(), SimError> {
    let eff = Effective::new(&args.dataset)?;
    let column = eff.timestamp_column()?;
    let cutoff = dataset::parse_timestamp(&args.cutoff).ok_or_else(|| SimError::Config {
        context: "split",
        detail: format!("cannot parse cutoff {:?}", args.cutoff),
    })?;

    let table = dataset::load_csv(&eff.filepath)?;
    let (historic, new) = dataset::split_by_cutoff(&table, column, cutoff)?;

    let (historic_path, new_path) = dataset::split_paths(Path::new(&eff.filepath));
    dataset::save_csv(&historic, &historic_path)?;
    dataset::save_csv(&new, &new_path)?;

    eprintln!(
        "split {} rows: {} historic -> {}, {} new -> {}",
        table.len(),
        historic.len(),
        historic_path.display(),
        new.len(),
        new_path.display()
    );
    Ok(())
}
