use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    ParsingError(#[from] std::num::ParseIntError),

    #[error("Address parsing error: {0}")]
    AddressParsingError(#[from] std::net::AddrParseError),

    #[error("Argument error: {0}")]
    ArgumentError(String),

    #[error("Inventory error: {0}")]
    InventoryError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
