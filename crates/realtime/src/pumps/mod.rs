//! Per-connection tasks spawned by [`WsClient`](crate::WsClient).

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
