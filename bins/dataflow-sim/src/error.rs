#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Dataset(#[from] dataset::DatasetError),

    #[error("{0}")]
    Replay(#[from] replay_api::ReplayError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("{failed} records failed (limit {limit})")]
    TooManyFailures { failed: usize, limit: usize },
}
