use tokio::sync::mpsc;
use tracing::warn;
use txmon_primitives::{CallbackData, DispatchCommand};

/// A cloneable front door onto a running [`crate::dispatcher::CallbackDispatcher`]
/// (§4.9), used by the admission layer to enqueue new callbacks and
/// relay acknowledgements without depending on the task internals.
#[derive(Clone)]
pub struct DispatchHandle {
    sender: mpsc::Sender<DispatchCommand>,
}

impl DispatchHandle {
    pub fn new(sender: mpsc::Sender<DispatchCommand>) -> Self {
        Self { sender }
    }

    /// Best-effort send: if the dispatcher task has already exited,
    /// the callback was already persisted by the Chain Monitor Task
    /// and will be picked up on the next restart's recovery pass.
    pub async fn new_callback(&self, data: CallbackData) {
        if self.sender.send(DispatchCommand::NewCallback(data)).await.is_err() {
            warn!("callback dispatcher gone, callback will be recovered on restart");
        }
    }

    pub async fn ack_callback(&self, id: String) {
        if self.sender.send(DispatchCommand::AckCallback(id)).await.is_err() {
            warn!("callback dispatcher gone, ack dropped");
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(DispatchCommand::Exit).await;
    }
}
