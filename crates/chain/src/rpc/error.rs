//! Error taxonomy for the Chain Client (§4.2, §7): transient node
//! errors are distinguished from protocol errors so callers can match
//! exhaustively instead of string-sniffing a transport error at every
//! call site.

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Could not reach the node at all: refused connection, DNS
    /// failure, timeout. Retryable.
    #[error("connection to bitcoin node failed: {0}")]
    ConnectionFailed(String),

    /// The node is reachable but still replaying its block index
    /// (bitcoind's `-28` "Verifying blocks..."). Retryable.
    #[error("bitcoin node still warming up: {0}")]
    NodeWarmingUp(String),

    /// The node answered but the response could not be interpreted as
    /// expected. Not retryable for the current request, but does not
    /// invalidate the client for subsequent requests.
    #[error("bitcoin node protocol error: {0}")]
    Protocol(String),
}

/// Classifies an underlying `bitcoincore_rpc_async` error into our
/// three-way taxonomy by inspecting its message, since the upstream
/// error type does not expose a stable enum for this distinction.
impl From<bitcoincore_rpc_async::Error> for RpcError {
    fn from(err: bitcoincore_rpc_async::Error) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();

        if lower.contains("verifying blocks") || lower.contains("warming up") || lower.contains("-28") {
            RpcError::NodeWarmingUp(msg)
        } else if lower.contains("connect")
            || lower.contains("refused")
            || lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("broken pipe")
        {
            RpcError::ConnectionFailed(msg)
        } else {
            RpcError::Protocol(msg)
        }
    }
}
