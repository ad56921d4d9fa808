use std::sync::Arc;

use tokio::sync::Notify;

/// Wakes an idle worker loop when a job has been submitted in the same process.
///
/// Jobs are always claimed from the database; the signal only shortens the idle wait.
#[derive(Clone, Default)]
pub struct JobSignal {
    notify: Arc<Notify>,
}

impl JobSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn notify_before_wait_is_not_lost() {
        let signal = JobSignal::new();
        let waiter = signal.clone();

        signal.notify();

        timeout(Duration::from_millis(200), waiter.notified())
            .await
            .expect("stored permit should wake the waiter");
    }
}
