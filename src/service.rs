use crate::estimation::{PipelineSettings, log_cycle_error, run_fetch_cycle, run_tick_cycle};
use crate::source::LotSource;
use crate::state::AppState;
use crate::weather::{WeatherSource, run_weather_cycle};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_WEATHER_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceSettings {
    pub fetch_interval: Duration,
    pub tick_interval: Duration,
    pub weather_interval: Duration,
    pub pipeline: PipelineSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            tick_interval: DEFAULT_TICK_INTERVAL,
            weather_interval: DEFAULT_WEATHER_INTERVAL,
            pipeline: PipelineSettings::default(),
        }
    }
}

/// Asks the fetch task for an immediate cycle. Requests made while one is
/// pending or running collapse into a single extra cycle.
#[derive(Debug, Clone, Default)]
pub struct RefreshTrigger {
    notify: Arc<Notify>,
}

impl RefreshTrigger {
    pub fn request(&self) {
        self.notify.notify_one();
    }

    pub(crate) async fn requested(&self) {
        self.notify.notified().await;
    }
}

pub struct LotService<S, W> {
    state: Arc<RwLock<AppState>>,
    source: Arc<S>,
    weather: Option<Arc<W>>,
    settings: ServiceSettings,
    refresh: RefreshTrigger,
}

impl<S, W> LotService<S, W>
where
    S: LotSource + 'static,
    W: WeatherSource + 'static,
{
    pub fn new(
        state: Arc<RwLock<AppState>>,
        source: S,
        weather: Option<W>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            state,
            source: Arc::new(source),
            weather: weather.map(Arc::new),
            settings,
            refresh: RefreshTrigger::default(),
        }
    }

    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.refresh.clone()
    }

    /// Spawn the fetch, tick and weather tasks.
    pub fn start(self) -> ServiceHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(3);

        info!(
            fetch_secs = self.settings.fetch_interval.as_secs(),
            tick_secs = self.settings.tick_interval.as_secs(),
            weather = self.weather.is_some(),
            "Starting lot service"
        );

        tasks.push(tokio::spawn(fetch_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.source),
            self.settings,
            self.refresh.clone(),
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(tick_loop(
            Arc::clone(&self.state),
            self.settings,
            shutdown_rx.clone(),
        )));
        match &self.weather {
            Some(weather) => tasks.push(tokio::spawn(weather_loop(
                Arc::clone(&self.state),
                Arc::clone(weather),
                self.settings,
                shutdown_rx,
            ))),
            None => debug!("No weather source configured, congestion uses time only"),
        }

        ServiceHandle {
            shutdown: shutdown_tx,
            tasks,
            refresh: self.refresh,
        }
    }
}

pub struct ServiceHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    refresh: RefreshTrigger,
}

impl ServiceHandle {
    pub fn refresh_trigger(&self) -> RefreshTrigger {
        self.refresh.clone()
    }

    /// Stop every task. In-flight requests are dropped, not awaited.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "Service task ended abnormally");
            }
        }
        info!("Lot service stopped");
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn fetch_loop<S: LotSource>(
    state: Arc<RwLock<AppState>>,
    source: Arc<S>,
    settings: ServiceSettings,
    refresh: RefreshTrigger,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(settings.fetch_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = ticker.tick() => {}
            _ = refresh.requested() => {
                debug!("Manual refresh requested");
                ticker.reset();
            }
        }

        // The cycle is awaited here, so fetches never overlap.
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            result = run_fetch_cycle(&state, source.as_ref(), &settings.pipeline) => {
                if let Err(err) = result {
                    log_cycle_error("fetch", &err);
                }
            }
        }
    }
    debug!("Fetch task stopped");
}

async fn tick_loop(
    state: Arc<RwLock<AppState>>,
    settings: ServiceSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first fetch resolves heuristic lots already.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = ticker.tick() => {
                if let Err(err) = run_tick_cycle(&state, &settings.pipeline) {
                    log_cycle_error("tick", &err);
                }
            }
        }
    }
    debug!("Tick task stopped");
}

async fn weather_loop<W: WeatherSource>(
    state: Arc<RwLock<AppState>>,
    source: Arc<W>,
    settings: ServiceSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(settings.weather_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let timeout = settings.pipeline.request_timeout;

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            result = run_weather_cycle(&state, source.as_ref(), timeout) => {
                if let Err(err) = result {
                    log_cycle_error("weather", &err);
                }
            }
        }
    }
    debug!("Weather task stopped");
}
