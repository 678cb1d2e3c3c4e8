//! Periodic background mining

use log::{debug, error, info};
use tokio::time::{self, Duration, MissedTickBehavior};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::blockchain::{Block, Ledger, MiningError};

/// Runs a mining round on every tick until stopped.
///
/// Each nonce search runs on a blocking worker thread so it never stalls the
/// async runtime serving submissions.
#[derive(Debug, Clone)]
pub struct Miner {
    ledger: Ledger,
    interval: Duration,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(ledger: Ledger, interval: Duration) -> Self {
        Miner {
            ledger,
            interval,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stops the loop and interrupts any nonce search in progress
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Mines one block on a blocking worker
    pub async fn mine_once(&self) -> Result<Block, MiningError> {
        let ledger = self.ledger.clone();
        let cancel = Arc::clone(&self.cancel);

        tokio::task::spawn_blocking(move || ledger.mine_with_cancel(&cancel))
            .await
            .map_err(|e| MiningError::Internal(format!("mining worker failed: {}", e)))?
    }

    pub async fn run(self) {
        info!("Mining every {:?}", self.interval);

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.is_stopped() {
                break;
            }

            match self.mine_once().await {
                Ok(_) => {}
                Err(MiningError::EmptyPool) => debug!("Skipping mining round: pool is empty"),
                Err(MiningError::Cancelled) => break,
                Err(err) => error!("Mining round failed: {}", err),
            }
        }

        info!("Mining stopped");
    }
}
