//! The session driver task and the handle used to command it.

use std::{mem, sync::Arc};

use chrono::Utc;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{
    models::{SaveReason, SessionEvent, Snapshot},
    SessionConfig,
};
use crate::{
    catalog::Catalog,
    economy::{self, Stats},
    gateway::{GatewayError, SaveGateway},
    models::{GameState, SettingsPatch},
    transition::{self, BuyAmount, Transition},
};

const COMMAND_BUFFER: usize = 128;
const EVENT_BUFFER: usize = 256;

/// The session task has stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("game session has ended")]
pub struct SessionError;

#[derive(Debug)]
enum Command {
    Click(oneshot::Sender<f64>),
    Purchase {
        id: String,
        amount: BuyAmount,
        reply: oneshot::Sender<bool>,
    },
    Research {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    Prestige(oneshot::Sender<u64>),
    UpdateSettings(SettingsPatch),
    Snapshot(oneshot::Sender<Snapshot>),
    SaveNow,
    Shutdown(oneshot::Sender<GameState>),
}

#[derive(Debug)]
struct SaveOutcome {
    reason: SaveReason,
    stamp: i64,
    result: Result<(), GatewayError>,
}

enum Wake {
    Command(Option<Command>),
    Tick,
    Autosave,
    Saved(SaveOutcome),
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Load the configured save and spawn the session task.
    ///
    /// A missing save starts a new game; so does a failed load, after logging.
    pub async fn start<G: SaveGateway>(
        gateway: Arc<G>,
        catalog: Arc<Catalog>,
        config: SessionConfig,
    ) -> Self {
        let state = match gateway.load(&config.save_id).await {
            Ok(Some(state)) => {
                info!(save_id = %config.save_id, currency = state.currency(), "Save loaded");
                state
            }
            Ok(None) => {
                info!(save_id = %config.save_id, "No save found; starting a new game");
                GameState::new()
            }
            Err(err) => {
                warn!(save_id = %config.save_id, ?err, "Failed to load save; starting a new game");
                GameState::new()
            }
        };
        Self::spawn(state, gateway, catalog, config)
    }

    /// Spawn the session task around an already-loaded state.
    pub fn spawn<G: SaveGateway>(
        state: GameState,
        gateway: Arc<G>,
        catalog: Arc<Catalog>,
        config: SessionConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (saves_tx, saves_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            state,
            catalog,
            gateway,
            config,
            commands: command_rx,
            events: event_tx.clone(),
            saves_tx,
            saves_rx,
            ticker: None,
            last_credit: Instant::now(),
            saving: false,
            pending_save: None,
        };
        tokio::spawn(driver.run());
        Self {
            commands: command_tx,
            events: event_tx,
        }
    }

    /// Receive session events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Click once; returns the amount dispensed.
    pub async fn click(&self) -> Result<f64, SessionError> {
        self.request(Command::Click).await
    }

    /// Buy upgrade levels; `false` when rejected.
    pub async fn purchase(&self, id: &str, amount: BuyAmount) -> Result<bool, SessionError> {
        let id = id.to_string();
        self.request(|reply| Command::Purchase { id, amount, reply })
            .await
    }

    /// Buy a research level; `false` when rejected.
    pub async fn purchase_research(&self, id: &str) -> Result<bool, SessionError> {
        let id = id.to_string();
        self.request(|reply| Command::Research { id, reply }).await
    }

    /// Reset for shards; returns the shards granted, 0 when nothing happened.
    pub async fn prestige(&self) -> Result<u64, SessionError> {
        self.request(Command::Prestige).await
    }

    /// Merge cosmetic settings.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<(), SessionError> {
        self.send(Command::UpdateSettings(patch)).await
    }

    /// Copy of the current state with derived stats.
    pub async fn snapshot(&self) -> Result<Snapshot, SessionError> {
        self.request(Command::Snapshot).await
    }

    /// Start a save now without waiting for it.
    pub async fn save_now(&self) -> Result<(), SessionError> {
        self.send(Command::SaveNow).await
    }

    /// Save one last time and stop; returns the final state.
    pub async fn shutdown(self) -> Result<GameState, SessionError> {
        self.request(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| SessionError)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| SessionError)
    }
}

struct Driver<G> {
    state: GameState,
    catalog: Arc<Catalog>,
    gateway: Arc<G>,
    config: SessionConfig,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<SessionEvent>,
    saves_tx: mpsc::UnboundedSender<SaveOutcome>,
    saves_rx: mpsc::UnboundedReceiver<SaveOutcome>,
    ticker: Option<Interval>,
    last_credit: Instant,
    saving: bool,
    // Requested while a save was running; written once it finishes.
    pending_save: Option<SaveReason>,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl<G: SaveGateway> Driver<G> {
    async fn run(mut self) -> GameState {
        let period = self.config.autosave_interval;
        let mut autosave = time::interval_at(Instant::now() + period, period);
        autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.sync_ticker();

        loop {
            // Timers and save results take precedence over queued commands.
            let wake = tokio::select! {
                biased;
                Some(outcome) = self.saves_rx.recv() => Wake::Saved(outcome),
                _ = next_tick(&mut self.ticker) => Wake::Tick,
                _ = autosave.tick() => Wake::Autosave,
                command = self.commands.recv() => Wake::Command(command),
            };

            match wake {
                Wake::Saved(outcome) => {
                    self.finish_save(outcome);
                    if let Some(reason) = self.pending_save.take() {
                        self.begin_save(reason);
                    }
                }
                Wake::Tick => self.credit_income(),
                Wake::Autosave => self.begin_save(SaveReason::Auto),
                Wake::Command(Some(Command::Shutdown(reply))) => {
                    let state = self.shutdown().await;
                    let _ = reply.send(state.clone());
                    return state;
                }
                Wake::Command(Some(command)) => self.handle(command),
                Wake::Command(None) => return self.shutdown().await,
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Click(reply) => {
                let (state, value) = transition::apply_click(self.take_state(), &self.catalog);
                self.state = state;
                let _ = reply.send(value);
                self.emit(SessionEvent::Clicked { value });
            }
            Command::Purchase { id, amount, reply } => {
                self.credit_income();
                let result =
                    transition::purchase_upgrades(self.take_state(), &self.catalog, &id, amount);
                let applied = self.commit(result, "Upgrade purchase rejected");
                let _ = reply.send(applied);
                if applied {
                    let level = self.state.upgrade_level(&id);
                    debug!(id = %id, level, "Upgrade purchased");
                    self.emit(SessionEvent::Purchased { id, level });
                }
            }
            Command::Research { id, reply } => {
                self.credit_income();
                let result = transition::purchase_research(self.take_state(), &self.catalog, &id);
                let applied = self.commit(result, "Research purchase rejected");
                let _ = reply.send(applied);
                if applied {
                    let level = self.state.research_level(&id);
                    info!(id = %id, level, "Research purchased");
                    self.emit(SessionEvent::Researched { id, level });
                }
            }
            Command::Prestige(reply) => {
                self.credit_income();
                let before = self.state.prestige_currency();
                let result = transition::perform_prestige(self.take_state());
                let applied = self.commit(result, "Prestige rejected");
                let gain = self.state.prestige_currency() - before;
                let _ = reply.send(gain);
                if applied {
                    let count = self.state.prestige_count();
                    info!(gain, count, "Neural reset performed");
                    self.emit(SessionEvent::Prestiged { gain, count });
                }
            }
            Command::UpdateSettings(patch) => {
                self.state = transition::update_settings(self.take_state(), &patch);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(Snapshot {
                    stats: Stats::compute(&self.state, &self.catalog),
                    state: self.state.clone(),
                    syncing: self.saving,
                });
            }
            Command::SaveNow => self.begin_save(SaveReason::Manual),
            // Consumed by the run loop before dispatch.
            Command::Shutdown(_) => {}
        }
    }

    fn take_state(&mut self) -> GameState {
        mem::take(&mut self.state)
    }

    fn commit(&mut self, result: Transition, rejected: &str) -> bool {
        if let Some(reason) = result.no_op() {
            debug!(?reason, "{rejected}");
        }
        let applied = result.is_applied();
        self.state = result.into_state();
        if applied {
            self.sync_ticker();
        }
        applied
    }

    /// Start or stop the tick interval to match the current auto power.
    fn sync_ticker(&mut self) {
        let earning = economy::auto_power(&self.state, &self.catalog) > 0.0;
        match (earning, self.ticker.is_some()) {
            (true, false) => {
                let period = self.config.tick_interval;
                let now = Instant::now();
                let mut ticker = time::interval_at(now + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.ticker = Some(ticker);
                self.last_credit = now;
                debug!("Tick process started");
            }
            (false, true) => {
                self.ticker = None;
                debug!("Tick process stopped");
            }
            _ => {}
        }
    }

    /// Credit passive income for the time since the previous credit.
    fn credit_income(&mut self) {
        if self.ticker.is_none() {
            return;
        }
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_credit);
        self.last_credit = now;
        self.state = transition::apply_tick(self.take_state(), &self.catalog, elapsed.as_secs_f64())
            .into_state();
    }

    /// Start a save of the current state, or queue one behind the running save.
    ///
    /// At most one save is in flight, so writes reach the gateway in order.
    fn begin_save(&mut self, reason: SaveReason) {
        if self.saving {
            self.pending_save = Some(reason);
            return;
        }
        let stamp = Utc::now().timestamp_millis();
        let snapshot = self.state.clone().with_last_save(stamp);
        let gateway = Arc::clone(&self.gateway);
        let save_id = self.config.save_id.clone();
        let outcomes = self.saves_tx.clone();
        self.saving = true;
        self.emit(SessionEvent::SaveStarted { reason });
        tokio::spawn(async move {
            let result = gateway.save(&save_id, &snapshot).await;
            let _ = outcomes.send(SaveOutcome {
                reason,
                stamp,
                result,
            });
        });
    }

    fn finish_save(&mut self, outcome: SaveOutcome) {
        self.saving = false;
        let SaveOutcome {
            reason,
            stamp,
            result,
        } = outcome;
        match result {
            Ok(()) => {
                if stamp > self.state.last_save {
                    self.state.last_save = stamp;
                }
                debug!(save_id = %self.config.save_id, ?reason, "Save stored");
                self.emit(SessionEvent::Saved { reason, at: stamp });
            }
            Err(err) => {
                warn!(save_id = %self.config.save_id, ?reason, ?err, "Save failed; retrying on the next autosave");
                self.emit(SessionEvent::SaveFailed {
                    reason,
                    error: err.to_string(),
                });
            }
        }
    }

    async fn shutdown(mut self) -> GameState {
        // Income stops when shutdown is requested.
        self.credit_income();
        self.ticker = None;
        // The final save supersedes any queued one but must land after the running one.
        self.pending_save = None;
        while self.saving {
            match self.saves_rx.recv().await {
                Some(outcome) => self.finish_save(outcome),
                None => break,
            }
        }
        let stamp = Utc::now().timestamp_millis();
        let snapshot = self.state.clone().with_last_save(stamp);
        let result = self.gateway.save(&self.config.save_id, &snapshot).await;
        match result {
            Ok(()) => {
                info!(save_id = %self.config.save_id, "Final save stored");
                self.emit(SessionEvent::Saved {
                    reason: SaveReason::Shutdown,
                    at: stamp,
                });
                snapshot
            }
            Err(err) => {
                warn!(save_id = %self.config.save_id, ?err, "Final save failed");
                self.emit(SessionEvent::SaveFailed {
                    reason: SaveReason::Shutdown,
                    error: err.to_string(),
                });
                self.state
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use parking_lot::Mutex;

    use super::*;
    use crate::gateway::GatewayError;

    #[derive(Default)]
    struct RecordingGateway {
        stored: Mutex<Option<GameState>>,
        writes: Mutex<Vec<GameState>>,
        save_calls: Mutex<usize>,
        first_save_delay: Option<Duration>,
        fail_saves: bool,
        fail_loads: bool,
    }

    impl RecordingGateway {
        fn with_state(state: GameState) -> Self {
            Self {
                stored: Mutex::new(Some(state)),
                ..Self::default()
            }
        }

        fn write_count(&self) -> usize {
            self.writes.lock().len()
        }

        fn written_currencies(&self) -> Vec<f64> {
            self.writes.lock().iter().map(GameState::currency).collect()
        }
    }

    impl SaveGateway for RecordingGateway {
        async fn load(&self, _save_id: &str) -> Result<Option<GameState>, GatewayError> {
            if self.fail_loads {
                return Err(GatewayError::Status(503));
            }
            Ok(self.stored.lock().clone())
        }

        async fn save(&self, _save_id: &str, state: &GameState) -> Result<(), GatewayError> {
            let call = {
                let mut calls = self.save_calls.lock();
                *calls += 1;
                *calls
            };
            if let (1, Some(delay)) = (call, self.first_save_delay) {
                time::sleep(delay).await;
            }
            if self.fail_saves {
                return Err(GatewayError::Status(503));
            }
            self.writes.lock().push(state.clone());
            *self.stored.lock() = Some(state.clone());
            Ok(())
        }
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::standard().clone())
    }

    fn state_with(currency: f64, upgrades: &[(&str, u32)]) -> GameState {
        GameState {
            currency,
            total_currency_earned: currency,
            upgrade_levels: upgrades
                .iter()
                .map(|(id, level)| (id.to_string(), *level))
                .collect::<BTreeMap<_, _>>(),
            ..GameState::default()
        }
    }

    async fn start(gateway: &Arc<RecordingGateway>) -> SessionHandle {
        SessionHandle::start(Arc::clone(gateway), catalog(), SessionConfig::default()).await
    }

    async fn wait_for_writes(gateway: &RecordingGateway, count: usize) {
        for _ in 0..100 {
            if gateway.write_count() >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} saves, saw {}", gateway.write_count());
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_session_starts_from_zero() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway::default());
        let session = start(&gateway).await;

        assert_eq!(session.click().await?, 1.0);
        assert_eq!(session.click().await?, 1.0);
        let snapshot = session.snapshot().await?;
        assert_eq!(snapshot.state.currency(), 2.0);
        assert_eq!(snapshot.state.click_count(), 2);
        assert_eq!(snapshot.stats.auto_power, 0.0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_falls_back_to_new_game() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway {
            stored: Mutex::new(Some(state_with(500.0, &[]))),
            fail_loads: true,
            ..RecordingGateway::default()
        });
        let session = start(&gateway).await;
        assert_eq!(session.snapshot().await?.state, GameState::new());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn tick_credits_elapsed_time_once_earning() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway::with_state(state_with(50.0, &[])));
        let session = start(&gateway).await;

        time::advance(Duration::from_secs(5)).await;
        assert_eq!(session.snapshot().await?.state.currency(), 50.0);

        assert!(session.purchase("auto_clicker", BuyAmount::One).await?);
        assert_eq!(session.snapshot().await?.state.currency(), 0.0);

        time::advance(Duration::from_secs(3)).await;
        let snapshot = session.snapshot().await?;
        assert_eq!(snapshot.state.currency(), 3.0);
        assert_eq!(snapshot.state.total_currency_earned(), 53.0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_purchase_changes_nothing() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway::with_state(state_with(9.0, &[])));
        let session = start(&gateway).await;

        assert!(!session.purchase("basic_click", BuyAmount::One).await?);
        assert!(!session.purchase("no_such_upgrade", BuyAmount::One).await?);
        let snapshot = session.snapshot().await?;
        assert_eq!(snapshot.state.currency(), 9.0);
        assert!(snapshot.state.upgrade_levels().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_fires_every_period() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway::default());
        let session = start(&gateway).await;
        session.click().await?;

        time::advance(Duration::from_secs(29)).await;
        session.snapshot().await?;
        assert_eq!(gateway.write_count(), 0);

        time::advance(Duration::from_secs(1)).await;
        wait_for_writes(&gateway, 1).await;
        let snapshot = session.snapshot().await?;
        assert!(snapshot.state.last_save() > 0);
        assert!(!snapshot.syncing);
        assert_eq!(gateway.writes.lock()[0].currency(), 1.0);

        time::advance(Duration::from_secs(30)).await;
        wait_for_writes(&gateway, 2).await;
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_does_not_interrupt_play() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway {
            fail_saves: true,
            ..RecordingGateway::default()
        });
        let session = start(&gateway).await;
        let mut events = session.subscribe();

        session.save_now().await?;
        assert_eq!(
            events.recv().await?,
            SessionEvent::SaveStarted {
                reason: SaveReason::Manual
            }
        );
        assert!(matches!(
            events.recv().await?,
            SessionEvent::SaveFailed {
                reason: SaveReason::Manual,
                ..
            }
        ));

        assert_eq!(session.click().await?, 1.0);
        let snapshot = session.snapshot().await?;
        assert_eq!(snapshot.state.currency(), 1.0);
        assert_eq!(snapshot.state.last_save(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn prestige_stops_passive_income() -> anyhow::Result<()> {
        let mut state = state_with(0.0, &[("factory", 4)]);
        state.total_currency_earned = 4_000_000.0;
        let gateway = Arc::new(RecordingGateway::with_state(state));
        let session = start(&gateway).await;
        let mut events = session.subscribe();

        assert_eq!(session.prestige().await?, 20);
        assert_eq!(
            events.recv().await?,
            SessionEvent::Prestiged { gain: 20, count: 1 }
        );
        assert_eq!(session.prestige().await?, 0);

        let snapshot = session.snapshot().await?;
        assert!(snapshot.state.upgrade_levels().is_empty());
        assert_eq!(snapshot.stats.prestige_multiplier, 1.2);

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(session.snapshot().await?.state.currency(), 0.0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn research_and_settings_flow_through() -> anyhow::Result<()> {
        let mut state = GameState::new();
        state.prestige_currency = 10;
        let gateway = Arc::new(RecordingGateway::with_state(state));
        let session = start(&gateway).await;

        assert!(session.purchase_research("optimized_synapse").await?);
        assert!(!session.purchase_research("optimized_synapse").await?);
        session
            .update_settings(SettingsPatch {
                enable_animations: Some(false),
                ..SettingsPatch::default()
            })
            .await?;

        let snapshot = session.snapshot().await?;
        assert_eq!(snapshot.state.research_level("optimized_synapse"), 1);
        assert_eq!(snapshot.stats.available_shards, 0);
        assert!(!snapshot.state.settings().enable_animations);
        // floor(1 × 1.25 × 1.1)
        assert_eq!(snapshot.stats.click_power, 1.0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn saves_queue_behind_a_running_save() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway {
            first_save_delay: Some(Duration::from_secs(10)),
            ..RecordingGateway::default()
        });
        let session = start(&gateway).await;

        session.save_now().await?;
        session.click().await?;
        session.save_now().await?;
        session.save_now().await?;
        assert!(session.snapshot().await?.syncing);

        time::advance(Duration::from_secs(10)).await;
        wait_for_writes(&gateway, 2).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(gateway.written_currencies(), vec![0.0, 1.0]);
        assert!(!session.snapshot().await?.syncing);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_running_save() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway {
            first_save_delay: Some(Duration::from_secs(10)),
            ..RecordingGateway::default()
        });
        let session = start(&gateway).await;

        session.save_now().await?;
        for _ in 0..5 {
            session.click().await?;
        }
        let state = session.shutdown().await?;
        assert_eq!(state.currency(), 5.0);
        assert_eq!(gateway.written_currencies(), vec![0.0, 5.0]);

        time::advance(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;
        assert_eq!(gateway.stored.lock().as_ref().map(GameState::currency), Some(5.0));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_saves_final_state() -> anyhow::Result<()> {
        let gateway = Arc::new(RecordingGateway::default());
        let session = start(&gateway).await;
        let observer = session.clone();
        session.click().await?;

        let state = session.shutdown().await?;
        assert_eq!(state.currency(), 1.0);
        assert!(state.last_save() > 0);
        assert_eq!(gateway.stored.lock().clone(), Some(state));
        assert_eq!(observer.click().await, Err(SessionError));
        Ok(())
    }
}
