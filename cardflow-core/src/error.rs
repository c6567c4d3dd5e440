use thiserror::Error;

/// Image bytes could not be turned into pixels.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unrecognized image format: {0}")]
    UnknownFormat(String),

    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to read image bytes: {0}")]
    Io(#[from] std::io::Error),
}

/// Object-store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence collaborator failures.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Pending image {0} not found or already staged")]
    NotFound(u64),

    #[error("SKU already catalogued: {0}")]
    SkuTaken(String),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog snapshot error: {0}")]
    Snapshot(String),
}

/// Job-dispatch failures.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job queue unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid job arguments: {0}")]
    InvalidArgs(String),
}

#[derive(Error, Debug)]
pub enum SkuError {
    #[error("SKU suffix space exhausted for candidate {0}")]
    Exhausted(String),
}

#[derive(Error, Debug)]
pub enum CardflowError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("SKU error: {0}")]
    Sku(#[from] SkuError),

    #[error("Thumbnail encoding error: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, CardflowError>;
