use tokio_util::sync::CancellationToken;

use pipeline::{ReplayEngine, Summary, build_sinks};
use replay_api::DELAY_COLUMN;

use crate::config::{Effective, StreamArgs};
use crate::error::SimError;

pub async fn run(args: StreamArgs) -> Result<(), SimError> {
    let eff = Effective::new(&args.dataset)?;

    // Без --derive читается результат `prepare`.
    let table = if args.derive {
        super::load_and_derive(&eff)?
    } else {
        dataset::load_csv(&eff.processed_path)?
    };
    if !table.schema().contains(DELAY_COLUMN) {
        tracing::warn!("no {DELAY_COLUMN} column, events will be sent without pauses");
    }

    let mut sink = build_sinks(&eff.sinks).await?;

    // --- Ctrl+C → cancel replay ---
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => tracing::error!(error = %e, "cannot listen for shutdown signal"),
        }
    });

    let engine = ReplayEngine::new(token).with_progress_every(args.progress_every);
    let summary = engine.run(&table, &mut sink).await?;
    print_summary(&summary);

    match args.max_failures {
        Some(limit) if summary.failed > limit => Err(SimError::TooManyFailures {
            failed: summary.failed,
            limit,
        }),
        _ => Ok(()),
    }
}

fn print_summary(summary: &Summary) {
    eprintln!(
        "rows: {}  emitted: {}  failed: {}  elapsed: {:.1}s{}",
        summary.rows_seen,
        summary.emitted,
        summary.failed,
        summary.elapsed.as_secs_f64(),
        if summary.cancelled { "  (cancelled)" } else { "" }
    );
    for failure in summary.failures.iter().take(20) {
        eprintln!("  row {}: {}", failure.index, failure.reason);
    }
    if summary.failures.len() > 20 {
        eprintln!("  ... and {} more", summary.failures.len() - 20);
    }
}
