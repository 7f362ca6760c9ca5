//! Background simulation worker and the caller-side handle that drives it.

use crate::command::{
    CommandReceiver, CommandSender, EventReceiver, EventSender, WorkerCommand, WorkerEvent,
    create_command_bus, create_event_bus, drain_pending_commands,
};
use cella_core::{CellaConfig, Engine, EngineError, EvaluationMode, Grid, RuleSet, check_inputs};
use crossfire::TryRecvError;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const WORKER_THREAD_NAME: &str = "cella-worker";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn cella-worker thread")]
    Spawn(#[source] io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("simulation worker is no longer running")]
    Disconnected,
}

/// Loop updates the caller may leave unread before the worker pauses.
pub const DEFAULT_MAX_PENDING_UPDATES: usize = 1;

/// How long a paused loop sleeps before looking at its commands again.
const LOOP_THROTTLE: Duration = Duration::from_millis(2);

/// Engine parameters that are not carried by `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Seed for the random action.
    pub seed: u64,
    pub mode: EvaluationMode,
    /// A running loop stops stepping while this many `Update`s are unread.
    pub max_pending_updates: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            mode: EvaluationMode::default(),
            max_pending_updates: DEFAULT_MAX_PENDING_UPDATES,
        }
    }
}

impl WorkerSettings {
    #[must_use]
    pub fn from_config(config: &CellaConfig) -> Self {
        Self {
            seed: config.rng_seed.unwrap_or_default(),
            mode: config.evaluation,
            ..Self::default()
        }
    }
}

enum Flow {
    Continue,
    Exit,
}

/// State owned by the worker thread.
struct Worker {
    settings: WorkerSettings,
    engine: Option<Engine>,
    looping: bool,
    events: EventSender,
    /// `Update`s sent but not yet taken by the handle.
    pending_updates: Arc<AtomicUsize>,
}

impl Worker {
    fn new(
        settings: WorkerSettings,
        events: EventSender,
        pending_updates: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            settings,
            engine: None,
            looping: false,
            events,
            pending_updates,
        }
    }

    fn backlogged(&self) -> bool {
        self.pending_updates.load(Ordering::Acquire) >= self.settings.max_pending_updates.max(1)
    }

    fn run(mut self, commands: CommandReceiver) {
        info!(settings = ?self.settings, "simulation worker started");
        loop {
            if !self.looping {
                match commands.recv() {
                    Ok(command) => {
                        if let Flow::Exit = self.handle(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }

            let drained = drain_pending_commands(&commands);
            let mut exit = drained.disconnected;
            for command in drained.commands {
                if let Flow::Exit = self.handle(command) {
                    exit = true;
                    break;
                }
            }
            if exit {
                break;
            }

            if self.looping {
                if self.backlogged() {
                    thread::park_timeout(LOOP_THROTTLE);
                    continue;
                }
                if !self.step() {
                    break;
                }
                thread::yield_now();
            }
        }
        info!("simulation worker exiting");
    }

    /// Commands take effect in arrival order; a `Start` steps before any
    /// later command is looked at.
    fn handle(&mut self, command: WorkerCommand) -> Flow {
        debug!(?command, "worker command");
        match command {
            WorkerCommand::Init {
                grid,
                rules,
                max_color,
            } => {
                self.looping = false;
                match Engine::with_rules(grid, rules, max_color) {
                    Ok(engine) => {
                        self.engine = Some(
                            engine
                                .with_seed(self.settings.seed)
                                .with_mode(self.settings.mode),
                        );
                        Flow::Continue
                    }
                    Err(err) => self.fault(format!("init rejected: {err}")),
                }
            }
            WorkerCommand::Start { grid } => match self.adopt(grid) {
                Ok(true) => {
                    self.looping = false;
                    if self.step() {
                        Flow::Continue
                    } else {
                        Flow::Exit
                    }
                }
                Ok(false) => Flow::Continue,
                Err(flow) => flow,
            },
            WorkerCommand::Loop { grid } => match self.adopt(grid) {
                Ok(adopted) => {
                    self.looping |= adopted;
                    Flow::Continue
                }
                Err(flow) => flow,
            },
            WorkerCommand::Stop => {
                self.looping = false;
                let generation = self.engine.as_ref().map_or(0, Engine::generation);
                self.emit(WorkerEvent::Stopped { generation });
                Flow::Continue
            }
            WorkerCommand::Shutdown => Flow::Exit,
        }
    }

    /// Hand `grid` to the engine. `Ok(false)` means there is no engine yet.
    fn adopt(&mut self, grid: Grid) -> Result<bool, Flow> {
        let Some(engine) = self.engine.as_mut() else {
            warn!("grid received before init; ignoring");
            return Ok(false);
        };
        match engine.adopt_grid(grid) {
            Ok(()) => Ok(true),
            Err(err) => Err(self.fault(err.to_string())),
        }
    }

    /// Run one generation and publish it. Returns `false` once nobody is listening.
    fn step(&mut self) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            self.looping = false;
            return true;
        };
        let summary = engine.step();
        let grid = engine.current_grid().clone();
        debug!(?summary, "worker stepped");
        self.pending_updates.fetch_add(1, Ordering::AcqRel);
        self.emit(WorkerEvent::Update {
            generation: summary.generation,
            grid,
        })
    }

    fn emit(&self, event: WorkerEvent) -> bool {
        if self.events.send(event).is_err() {
            warn!("event receiver dropped");
            return false;
        }
        true
    }

    fn fault(&self, message: String) -> Flow {
        error!(%message, "simulation worker fault");
        self.emit(WorkerEvent::Fault(message));
        Flow::Exit
    }
}

/// Caller side of the worker: posts commands and receives events.
///
/// Dropping the handle shuts the worker down and joins its thread.
pub struct WorkerHandle {
    commands: CommandSender,
    events: EventReceiver,
    pending_updates: Arc<AtomicUsize>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(settings: WorkerSettings) -> Result<Self, WorkerError> {
        let (commands, command_rx) = create_command_bus();
        let (event_tx, events) = create_event_bus();
        let pending_updates = Arc::new(AtomicUsize::new(0));
        let worker = Worker::new(settings, event_tx, Arc::clone(&pending_updates));
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || worker.run(command_rx))
            .map_err(WorkerError::Spawn)?;
        Ok(Self {
            commands,
            events,
            pending_updates,
            thread: Some(thread),
        })
    }

    /// Compile `codes` and check `grid` here, so mistakes surface before the
    /// worker sees anything, then post `Init`.
    pub fn init<I, S>(&self, grid: Grid, codes: I, max_color: u8) -> Result<(), WorkerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = RuleSet::compile(codes).map_err(EngineError::from)?;
        check_inputs(&grid, max_color)?;
        self.send(WorkerCommand::Init {
            grid,
            rules,
            max_color,
        })
    }

    pub fn start(&self, grid: Grid) -> Result<(), WorkerError> {
        self.send(WorkerCommand::Start { grid })
    }

    pub fn run_loop(&self, grid: Grid) -> Result<(), WorkerError> {
        self.send(WorkerCommand::Loop { grid })
    }

    pub fn stop(&self) -> Result<(), WorkerError> {
        self.send(WorkerCommand::Stop)
    }

    fn send(&self, command: WorkerCommand) -> Result<(), WorkerError> {
        self.commands
            .send(command)
            .map_err(|_| WorkerError::Disconnected)?;
        self.wake();
        Ok(())
    }

    /// Cut short a throttled loop's pause.
    fn wake(&self) {
        if let Some(handle) = &self.thread {
            handle.thread().unpark();
        }
    }

    fn taken(&self, event: WorkerEvent) -> WorkerEvent {
        if let WorkerEvent::Update { .. } = event {
            self.pending_updates.fetch_sub(1, Ordering::AcqRel);
            self.wake();
        }
        event
    }

    /// Block until the next event. `None` once the worker has exited and
    /// every event has been read.
    pub fn recv_event(&self) -> Option<WorkerEvent> {
        self.events.recv().ok().map(|event| self.taken(event))
    }

    pub fn try_recv_event(&self) -> Result<Option<WorkerEvent>, WorkerError> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(self.taken(event))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Ask the worker to exit and wait for it. Events it already sent stay
    /// readable.
    pub fn shutdown(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.thread.take()
            && let Err(err) = handle.join()
        {
            error!(?err, "simulation worker thread panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config_seed_and_mode() {
        let config = CellaConfig {
            rng_seed: Some(31),
            evaluation: EvaluationMode::Exhaustive,
            ..CellaConfig::default()
        };
        let settings = WorkerSettings::from_config(&config);
        assert_eq!(settings.seed, 31);
        assert_eq!(settings.mode, EvaluationMode::Exhaustive);
        assert_eq!(
            WorkerSettings::from_config(&CellaConfig::default()),
            WorkerSettings::default()
        );
    }

    #[test]
    fn commands_apply_in_arrival_order() {
        let (event_tx, events) = create_event_bus();
        let pending = Arc::new(AtomicUsize::new(0));
        let mut worker = Worker::new(WorkerSettings::default(), event_tx, Arc::clone(&pending));
        let grid = Grid::new(4).expect("grid");

        assert!(matches!(
            worker.handle(WorkerCommand::Loop { grid: grid.clone() }),
            Flow::Continue
        ));
        assert!(!worker.looping);

        worker.handle(WorkerCommand::Init {
            grid: grid.clone(),
            rules: RuleSet::default(),
            max_color: 1,
        });
        worker.handle(WorkerCommand::Loop { grid: grid.clone() });
        assert!(worker.looping);

        // Start ends the loop and steps straight away; Stop cannot undo it.
        worker.handle(WorkerCommand::Start { grid });
        assert!(!worker.looping);
        worker.handle(WorkerCommand::Stop);
        assert!(matches!(
            events.try_recv().ok(),
            Some(WorkerEvent::Update { generation: 1, .. })
        ));
        assert_eq!(
            events.try_recv().ok(),
            Some(WorkerEvent::Stopped { generation: 1 })
        );
        assert_eq!(pending.load(Ordering::Acquire), 1);
        assert!(worker.backlogged());
        assert!(matches!(worker.handle(WorkerCommand::Shutdown), Flow::Exit));
    }
}
