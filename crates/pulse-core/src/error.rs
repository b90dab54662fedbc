use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("not connected")]
    NotConnected,
    #[error("publish failed on '{topic}': {message}")]
    Publish { topic: String, message: String },
    #[error("subscribe failed for '{filter}': {message}")]
    Subscribe { filter: String, message: String },
    #[error("unsubscribe failed for '{filter}': {message}")]
    Unsubscribe { filter: String, message: String },
    #[error("invalid topic filter: {filter}")]
    InvalidFilter { filter: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sql failed: {message}")]
    Sql { message: String },
    #[error("json encode failed: {message}")]
    JsonEncode { message: String },
    #[error("json decode failed: {message}")]
    JsonDecode { message: String },
    #[error("invalid timestamp: {value}")]
    InvalidTimestamp { value: String },
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}

#[derive(Debug, Error)]
pub enum EmitError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("event encode failed: {message}")]
    Encode { message: String },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("render failed: {message}")]
    Render { message: String },
    #[error("write failed: {message}")]
    Write { message: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config read failed: {message}")]
    Read { message: String },
    #[error("config parse failed: {message}")]
    Parse { message: String },
    #[error("invalid config value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum PulseError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
