//! Application assembly and run loop.

use std::sync::Arc;

use tracing::info;

use sigex_exchange::PaperExchange;
use sigex_lifecycle::{spawn_order_store, Coordinator, Poller};
use sigex_session::SessionMonitor;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::ops::{self, OpsState};

/// Wires the store, coordinator, poller, session monitor, and ops server
/// together and runs them until shutdown.
pub struct Application {
    config: AppConfig,
}

impl Application {
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run until the ops server stops or a shutdown signal arrives.
    pub async fn run(self) -> AppResult<()> {
        let (store, store_join) = spawn_order_store(self.config.store_capacity);

        let exchange = Arc::new(PaperExchange::new());
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            Arc::clone(&exchange),
            self.config.coordinator,
        ));

        let poller = Poller::new(
            store.clone(),
            Arc::clone(&exchange),
            Arc::clone(&coordinator),
            self.config.poller,
        );
        let poller_task = tokio::spawn(poller.run());

        let monitor = Arc::new(SessionMonitor::new(
            Arc::clone(&coordinator),
            self.config.sessions,
        ));
        let monitor_task = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.run().await })
        };

        let router = ops::router(OpsState {
            coordinator,
            monitor,
        });
        let listener = tokio::net::TcpListener::bind(&self.config.ops.listen_addr).await?;
        info!(addr = %self.config.ops.listen_addr, "Ops server listening");

        tokio::select! {
            result = axum::serve(listener, router) => {
                result?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
        }

        poller_task.abort();
        monitor_task.abort();
        store.shutdown().await;
        let _ = store_join.await;
        info!("Shutdown complete");
        Ok(())
    }
}
