use thiserror::Error;

#[derive(Error, Debug)]
pub enum SparlaCoreError {
    #[error("WGPU initialization failed: {0}")]
    WgpuInit(String),

    #[error("WGPU error: {0}")]
    Wgpu(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("memory space mismatch: {0}")]
    MemorySpaceMismatch(String),

    #[error("format conversion refused: {0}")]
    FormatConversion(String),

    #[error("invalid matrix structure: {0}")]
    InvalidStructure(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SparlaCoreError>;
