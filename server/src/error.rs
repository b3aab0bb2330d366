use voxel_shared::BlockPos;

/// Failures the server can recover from. None of these is fatal to the
/// process; each is confined to the connection or task that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerError {
    /// Coordinate lies outside the world bounds
    OutOfBounds(BlockPos),

    /// Block type id outside `0..=MAX_BLOCK_TYPE`
    InvalidBlockType(i32),

    /// Inbound frame could not be decoded into a known message
    MalformedMessage(String),

    /// Send or receive failure on a session channel
    Transport(String),

    /// Snapshot load or save failure
    Persistence(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::OutOfBounds(pos) => write!(f, "Position {} is out of bounds", pos),
            ServerError::InvalidBlockType(t) => write!(f, "Invalid block type {}", t),
            ServerError::MalformedMessage(s) => write!(f, "Malformed message: {}", s),
            ServerError::Transport(s) => write!(f, "Transport error: {}", s),
            ServerError::Persistence(s) => write!(f, "Persistence error: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::Persistence(e.to_string())
    }
}
