use std::time::Duration;

use bson::doc;
use eyre::WrapErr;
use mongodb::{
    event::{sdam::SdamEvent, EventHandler},
    options::ClientOptions,
    Client,
};
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{error, info, warn};

const MAX_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(5);
const SELECTION_TIMEOUT: Duration = Duration::from_secs(5);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(45);

/// Connection state as reported by `/health`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbState {
    Connecting,
    Connected,
    Disconnected,
    Disconnecting,
}

impl DbState {
    pub fn as_str(self) -> &'static str {
        match self {
            DbState::Connecting => "connecting",
            DbState::Connected => "connected",
            DbState::Disconnected => "disconnected",
            DbState::Disconnecting => "disconnecting",
        }
    }
}

/// Simplified view of the driver's topology events, forwarded out of the
/// event callback into a channel the supervisor task owns.
enum DbSignal {
    Up,
    Down,
    Closed,
}

/// Retry bookkeeping for the bootstrap: one initial attempt plus retries,
/// `max_attempts` total, and a success resets the budget.
#[derive(Debug)]
struct Bootstrap {
    attempts: u32,
    max_attempts: u32,
}

impl Bootstrap {
    fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    fn record_success(&mut self) {
        self.attempts = 0;
    }

    /// Returns whether another attempt remains in the budget.
    fn record_failure(&mut self) -> bool {
        self.attempts += 1;
        self.attempts < self.max_attempts
    }

    fn attempt(&self) -> u32 {
        self.attempts + 1
    }
}

/// Opens the process's single client, blocks until the first successful
/// connection (or gives up after the retry budget), and spawns a supervisor
/// that reconnects on drop. The returned watch receiver tracks [`DbState`].
pub async fn connect(uri: &str) -> eyre::Result<(Client, watch::Receiver<DbState>)> {
    let (state_tx, state_rx) = watch::channel(DbState::Connecting);
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    let mut options = ClientOptions::parse(uri)
        .await
        .wrap_err("invalid connection string")?;
    options.server_selection_timeout = Some(SELECTION_TIMEOUT);
    options.socket_timeout = Some(SOCKET_TIMEOUT);
    options.sdam_event_handler = Some(EventHandler::callback(move |event: SdamEvent| {
        let signal = match event {
            SdamEvent::ServerHeartbeatSucceeded(_) => DbSignal::Up,
            SdamEvent::ServerHeartbeatFailed(_) => DbSignal::Down,
            SdamEvent::TopologyClosed(_) => DbSignal::Closed,
            _ => return,
        };

        let _ = signal_tx.send(signal);
    }));

    let client = Client::with_options(options)?;

    let mut bootstrap = Bootstrap::new(MAX_ATTEMPTS);
    establish(&client, &mut bootstrap, &state_tx).await?;

    tokio::spawn(supervise(client.clone(), signal_rx, state_tx));

    Ok((client, state_rx))
}

/// Pings the server until it answers, sleeping a fixed delay between
/// attempts. Fails once the bootstrap budget is spent.
async fn establish(
    client: &Client,
    bootstrap: &mut Bootstrap,
    state: &watch::Sender<DbState>,
) -> eyre::Result<()> {
    state.send_replace(DbState::Connecting);

    loop {
        match ping(client).await {
            Ok(()) => {
                bootstrap.record_success();
                state.send_replace(DbState::Connected);
                info!("database connected");
                return Ok(());
            }
            Err(err) => {
                warn!(
                    attempt = bootstrap.attempt(),
                    max_attempts = bootstrap.max_attempts,
                    error = %err,
                    "database connection attempt failed",
                );

                if !bootstrap.record_failure() {
                    state.send_replace(DbState::Disconnected);
                    return Err(err).wrap_err("connection retry budget exhausted");
                }

                time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn ping(client: &Client) -> Result<(), mongodb::error::Error> {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await?;

    Ok(())
}

/// Listens to the driver's lifecycle signals. A drop of an established
/// connection restarts the bounded establish loop; exhausting it is fatal.
async fn supervise(
    client: Client,
    mut signals: mpsc::UnboundedReceiver<DbSignal>,
    state: watch::Sender<DbState>,
) {
    let mut bootstrap = Bootstrap::new(MAX_ATTEMPTS);

    // Heartbeat failures queued while the initial bootstrap retried are
    // stale; replaying them would force a reconnect right after startup.
    drain(&mut signals);

    while let Some(signal) = signals.recv().await {
        match signal {
            DbSignal::Up => {
                bootstrap.record_success();

                if *state.borrow() != DbState::Connected {
                    state.send_replace(DbState::Connected);
                    info!("database connected");
                }
            }
            DbSignal::Down => {
                if *state.borrow() != DbState::Connected {
                    continue;
                }

                warn!("database connection lost, reconnecting");
                state.send_replace(DbState::Disconnected);

                if let Err(err) = establish(&client, &mut bootstrap, &state).await {
                    error!("reconnection failed: {err:?}");
                    std::process::exit(1);
                }

                // Heartbeat failures queued up during the reconnect are stale.
                drain(&mut signals);
            }
            DbSignal::Closed => {
                state.send_replace(DbState::Disconnecting);
            }
        }
    }
}

fn drain(signals: &mut mpsc::UnboundedReceiver<DbSignal>) {
    while signals.try_recv().is_ok() {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_five_total_attempts() {
        let mut bootstrap = Bootstrap::new(MAX_ATTEMPTS);

        for _ in 0..4 {
            assert!(bootstrap.record_failure());
        }

        assert!(!bootstrap.record_failure());
    }

    #[test]
    fn success_resets_the_budget() {
        let mut bootstrap = Bootstrap::new(MAX_ATTEMPTS);

        for _ in 0..4 {
            assert!(bootstrap.record_failure());
        }

        bootstrap.record_success();
        assert_eq!(bootstrap.attempt(), 1);

        for _ in 0..4 {
            assert!(bootstrap.record_failure());
        }
    }

    #[tokio::test]
    async fn queued_signals_are_discarded_by_drain() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(DbSignal::Down).unwrap();
        tx.send(DbSignal::Down).unwrap();
        tx.send(DbSignal::Up).unwrap();

        drain(&mut rx);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn state_names_match_the_wire_contract() {
        assert_eq!(DbState::Connecting.as_str(), "connecting");
        assert_eq!(DbState::Connected.as_str(), "connected");
        assert_eq!(DbState::Disconnected.as_str(), "disconnected");
        assert_eq!(DbState::Disconnecting.as_str(), "disconnecting");
    }
}
