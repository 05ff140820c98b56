use std::path::PathBuf;

use crate::config::{Effective, PrepareArgs};
use crate::error::SimError;

pub async fn run(args: PrepareArgs) -> Result<(), SimError> {
    let eff = Effective::new(&args.dataset)?;
    let table = super::load_and_derive(&eff)?;

    let output = match args.output {
        Some(path) => PathBuf::from(path),
        None => eff.processed_path.clone(),
    };
    dataset::save_csv(&table, &output)?;

    eprintln!("prepared {} rows -> {}", table.len(), output.display());
    Ok(())
}
