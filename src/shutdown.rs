use tokio::sync::watch;

/// `true` once shutdown has been requested. Late subscribers still observe it.
pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

#[must_use]
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

pub fn request_shutdown(shutdown_tx: &ShutdownSender) {
    shutdown_tx.send_replace(true);
}

#[must_use]
pub fn is_shutdown(shutdown_rx: &ShutdownReceiver) -> bool {
    *shutdown_rx.borrow()
}

/// Resolves once shutdown is requested or every sender is gone.
pub async fn wait_for_shutdown(shutdown_rx: &mut ShutdownReceiver) {
    drop(shutdown_rx.wait_for(|requested| *requested).await);
}
