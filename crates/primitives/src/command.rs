use crate::{CallbackData, SubscriptionData};

/// Commands accepted by the Chain Monitor Task's inbound channel (§4.9).
#[derive(Debug, Clone)]
pub enum MonitorCommand {
    NewSubscription(SubscriptionData),
    CancelSubscription(i64),
    Exit,
}

/// Commands accepted by the Callback Dispatcher Task's inbound channel.
#[derive(Debug, Clone)]
pub enum DispatchCommand {
    NewCallback(CallbackData),
    AckCallback(String),
    Exit,
}
