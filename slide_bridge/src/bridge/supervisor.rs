use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::bridge::axis::{AxisError, AxisFactory, AxisHandle, MotionAxis};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

type InitTask = JoinHandle<Result<AxisHandle, AxisError>>;

/// Owns the optional device handle of one slide and decides when to try
/// building a new one.
pub struct ConnectionSupervisor {
    factory: Arc<dyn AxisFactory>,
    handle: Option<AxisHandle>,
    pending: Option<InitTask>,
    last_init_attempt: Option<Instant>,
    cooldown: Duration,
}

impl ConnectionSupervisor {
    pub fn new(factory: Arc<dyn AxisFactory>, cooldown: Duration) -> Self {
        Self {
            factory,
            handle: None,
            pending: None,
            last_init_attempt: None,
            cooldown,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<&dyn MotionAxis> {
        self.handle.as_deref()
    }

    #[cfg(test)]
    pub fn is_initializing(&self) -> bool {
        self.pending.is_some()
    }

    /// Drops the handle. The next attempt waits out the cooldown from now.
    pub fn disconnect(&mut self) {
        if self.handle.take().is_some() {
            self.last_init_attempt = Some(Instant::now());
            info!("Handle dropped, next initialization in {:?}", self.cooldown);
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        self.last_init_attempt
            .is_none_or(|attempt| attempt.elapsed() >= self.cooldown)
    }

    /// Moves initialization forward without waiting on it.
    ///
    /// Returns the outcome of an attempt once it has finished, `None` while
    /// there is nothing new to report.
    pub async fn ensure(&mut self) -> Option<Result<(), AxisError>> {
        if self.handle.is_some() {
            return None;
        }

        if let Some(task) = self.pending.take() {
            if !task.is_finished() {
                self.pending = Some(task);
                return None;
            }

            let outcome = match task.await {
                Ok(Ok(handle)) => {
                    self.handle = Some(handle);
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(e) => Err(AxisError::Init(format!("Initialization task failed: {}", e))),
            };
            return Some(outcome);
        }

        if !self.cooldown_elapsed() {
            return None;
        }

        debug!("Starting initialization");
        self.last_init_attempt = Some(Instant::now());
        let factory = self.factory.clone();
        self.pending = Some(tokio::spawn(async move { factory.init().await }));
        None
    }

    /// Reads busy, then position. A transport fault drops the handle.
    pub async fn sample(&mut self) -> Result<(bool, f64), AxisError> {
        let Some(handle) = self.handle.as_deref() else {
            return Err(AxisError::NotInitialized);
        };

        let sample = async {
            let busy = handle.is_busy().await?;
            let position = handle.get_position().await?;
            Ok::<_, AxisError>((busy, position))
        }
        .await;

        if let Err(e) = &sample {
            if e.is_transport() {
                warn!("Lost connection: {}", e);
                self.disconnect();
            }
        }
        sample
    }

    #[cfg(test)]
    pub async fn settle(&self) {
        while self.pending.as_ref().is_some_and(|task| !task.is_finished()) {
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;
    use crate::bridge::{
        axis::TransportKind,
        testing::{AxisCall, FakeFactory},
    };

    async fn connected(factory: &Arc<FakeFactory>) -> ConnectionSupervisor {
        let mut supervisor = ConnectionSupervisor::new(factory.clone(), DEFAULT_COOLDOWN);
        assert!(supervisor.ensure().await.is_none());
        supervisor.settle().await;
        assert_eq!(supervisor.ensure().await, Some(Ok(())));
        supervisor
    }

    #[tokio::test(start_paused = true)]
    async fn one_attempt_per_cooldown() {
        let factory = FakeFactory::failing("No devices found");
        let mut supervisor = ConnectionSupervisor::new(factory.clone(), DEFAULT_COOLDOWN);

        assert!(supervisor.ensure().await.is_none());
        supervisor.settle().await;
        assert_eq!(
            supervisor.ensure().await,
            Some(Err(AxisError::Init("No devices found".to_string())))
        );

        advance(Duration::from_secs(5)).await;
        assert!(supervisor.ensure().await.is_none());
        supervisor.settle().await;
        assert!(!supervisor.is_initializing());
        assert_eq!(factory.attempts(), 1);

        advance(Duration::from_secs(6)).await;
        assert!(supervisor.ensure().await.is_none());
        supervisor.settle().await;
        assert_eq!(factory.attempts(), 2);
        assert!(!supervisor.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_blocks_new_ones() {
        let factory = FakeFactory::working();
        factory.set_delay(Duration::from_secs(30));
        let mut supervisor = ConnectionSupervisor::new(factory.clone(), DEFAULT_COOLDOWN);

        assert!(supervisor.ensure().await.is_none());
        // Let the attempt start its delay before the clock moves.
        tokio::task::yield_now().await;
        advance(Duration::from_secs(15)).await;
        assert!(supervisor.ensure().await.is_none());
        assert!(supervisor.is_initializing());

        advance(Duration::from_secs(20)).await;
        supervisor.settle().await;
        assert_eq!(supervisor.ensure().await, Some(Ok(())));
        assert_eq!(factory.attempts(), 1);
    }

    #[tokio::test]
    async fn sample_reads_busy_then_position() {
        let factory = FakeFactory::working();
        factory.axis().set_busy(true);
        factory.axis().set_position(7.5);
        let mut supervisor = connected(&factory).await;

        assert_eq!(supervisor.sample().await, Ok((true, 7.5)));
        assert_eq!(
            factory.axis().calls(),
            vec![AxisCall::IsBusy, AxisCall::GetPosition]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_fault_drops_handle() {
        let factory = FakeFactory::working();
        let mut supervisor = connected(&factory).await;
        factory.axis().fail_sampling(AxisError::transport(
            TransportKind::ConnectionClosed,
            "Connection closed: broken pipe",
        ));

        assert!(supervisor.sample().await.is_err());
        assert!(!supervisor.is_connected());

        // The cooldown restarts at the disconnect.
        assert!(supervisor.ensure().await.is_none());
        assert!(!supervisor.is_initializing());
        advance(DEFAULT_COOLDOWN).await;
        assert!(supervisor.ensure().await.is_none());
        assert!(supervisor.is_initializing());
    }

    #[tokio::test]
    async fn other_faults_keep_handle() {
        let factory = FakeFactory::working();
        let mut supervisor = connected(&factory).await;
        factory
            .axis()
            .fail_sampling(AxisError::Command("Unexpected data 'x'".to_string()));

        assert_eq!(
            supervisor.sample().await,
            Err(AxisError::Command("Unexpected data 'x'".to_string()))
        );
        assert!(supervisor.is_connected());
    }
}
