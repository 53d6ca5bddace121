use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("wrote only {written} of {len} bytes")]
    ShortWrite { written: usize, len: usize },

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("transport has been stopped")]
    Stopped,
}
