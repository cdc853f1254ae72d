use std::path::PathBuf;

use thiserror::Error;

use crate::transport::ConnId;

/// Failures that stop a state machine from being built.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cannot read input file {path}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chunk size {0} outside 1..={max}", max = crate::protocol::MAX_CHUNK_SIZE)]
    InvalidChunkSize(usize),
}

/// Errors a [`Transport`](crate::transport::Transport) reports synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),

    #[error("connection {0} is closed")]
    Closed(ConnId),

    #[error("connection {0} is not established")]
    NotConnected(ConnId),

    #[error("port {0} already in use")]
    AddressInUse(u16),

    #[error("connection {0} cannot do that in its current state")]
    InvalidState(ConnId),
}
