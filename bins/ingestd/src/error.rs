use ingest_api::SinkError;
use ingest_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum IngestdError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("dead-letter store: {0}")]
    Sink(#[from] SinkError),

    #[error("input: {0}")]
    Input(std::io::Error),

    #[error("output: {0}")]
    Output(std::io::Error),

    #[error("signal: {0}")]
    Signal(std::io::Error),
}
