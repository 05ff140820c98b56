use replay_api::ReplayError;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("cannot read {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("cannot write {path}: {source}")]
    Write { path: String, source: std::io::Error },

    #[error("dataset is empty: no header row")]
    Empty,

    #[error("line {line}: expected {expected} fields, found {found}")]
    Ragged { line: usize, expected: usize, found: usize },

    #[error(transparent)]
    Replay(#[from] ReplayError),
}
