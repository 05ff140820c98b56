use replay_api::ReplayError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("sink config ({sink}): {detail}")]
    SinkConfig { sink: String, detail: String },

    #[error("sink open ({sink}): {source}")]
    SinkOpen { sink: String, source: std::io::Error },

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

impl PipelineError {
    pub(crate) fn sink_config(sink: &str, detail: impl Into<String>) -> Self {
        Self::SinkConfig {
            sink: sink.to_string(),
            detail: detail.into(),
        }
    }
}
