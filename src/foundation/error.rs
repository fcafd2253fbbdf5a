pub type KnitResult<T> = Result<T, KnitError>;

#[derive(thiserror::Error, Debug)]
pub enum KnitError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unit error: {0}")]
    Units(String),

    #[error("scene error: {0}")]
    Scene(String),

    #[error("flow error: {0}")]
    Flow(String),

    #[error("sampling error: {0}")]
    Sampling(String),

    #[error("trace error: {0}")]
    Trace(String),

    #[error("compile error: {0}")]
    Compile(String),

    #[error("knitout error at line {line}: {message}")]
    Knitout { line: usize, message: String },

    #[error("worker error: {0}")]
    Worker(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KnitError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn units(msg: impl Into<String>) -> Self {
        Self::Units(msg.into())
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene(msg.into())
    }

    pub fn flow(msg: impl Into<String>) -> Self {
        Self::Flow(msg.into())
    }

    pub fn sampling(msg: impl Into<String>) -> Self {
        Self::Sampling(msg.into())
    }

    pub fn trace(msg: impl Into<String>) -> Self {
        Self::Trace(msg.into())
    }

    pub fn compile(msg: impl Into<String>) -> Self {
        Self::Compile(msg.into())
    }

    pub fn knitout(line: usize, msg: impl Into<String>) -> Self {
        Self::Knitout {
            line,
            message: msg.into(),
        }
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

impl From<serde_json::Error> for KnitError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
