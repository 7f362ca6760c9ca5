use cella_core::{Grid, RuleSet};
use crossfire::mpsc;
use crossfire::{MTx, Rx, TryRecvError, detect_backoff_cfg};
use std::fmt;

/// Messages from the caller to the simulation worker.
pub enum WorkerCommand {
    /// Rebuild the engine from scratch.
    Init {
        grid: Grid,
        rules: RuleSet,
        max_color: u8,
    },
    /// Adopt `grid` and run exactly one generation.
    Start { grid: Grid },
    /// Adopt `grid` and keep stepping until stopped.
    Loop { grid: Grid },
    Stop,
    /// Exit the worker thread.
    Shutdown,
}

impl fmt::Debug for WorkerCommand {
    // Grids are large; log their dimension only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init {
                grid,
                rules,
                max_color,
            } => f
                .debug_struct("Init")
                .field("size", &grid.size())
                .field("rules", &rules.codes())
                .field("max_color", max_color)
                .finish(),
            Self::Start { grid } => f.debug_struct("Start").field("size", &grid.size()).finish(),
            Self::Loop { grid } => f.debug_struct("Loop").field("size", &grid.size()).finish(),
            Self::Stop => f.write_str("Stop"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Messages from the worker back to the caller, in step-completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A generation finished; `grid` is a snapshot of its result.
    Update { generation: u64, grid: Grid },
    /// A `Stop` was handled; no further `Update` follows until the next
    /// `Start` or `Loop`.
    Stopped { generation: u64 },
    /// The worker hit a contract violation and exited.
    Fault(String),
}

pub type CommandSender = MTx<WorkerCommand>;
pub type CommandReceiver = Rx<WorkerCommand>;
pub type EventSender = MTx<WorkerEvent>;
pub type EventReceiver = Rx<WorkerEvent>;

pub fn create_command_bus() -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpsc::unbounded_blocking()
}

/// Unbounded so the worker never blocks on a slow caller. A running loop
/// pauses instead once `WorkerSettings::max_pending_updates` updates sit
/// unread, which keeps the queue to a handful of grid snapshots.
pub fn create_event_bus() -> (EventSender, EventReceiver) {
    detect_backoff_cfg();
    mpsc::unbounded_blocking()
}

/// Result of emptying the command queue without blocking.
#[derive(Debug, Default)]
pub struct Drained {
    pub commands: Vec<WorkerCommand>,
    pub disconnected: bool,
}

pub fn drain_pending_commands(receiver: &CommandReceiver) -> Drained {
    let mut drained = Drained::default();
    loop {
        match receiver.try_recv() {
            Ok(command) => drained.commands.push(command),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                drained.disconnected = true;
                break;
            }
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_commands_in_order_and_flags_disconnect() {
        let (tx, rx) = create_command_bus();
        let grid = Grid::new(2).expect("grid");
        tx.send(WorkerCommand::Start { grid: grid.clone() })
            .expect("send");
        tx.send(WorkerCommand::Stop).expect("send");

        let drained = drain_pending_commands(&rx);
        assert!(!drained.disconnected);
        assert!(matches!(
            drained.commands.as_slice(),
            [WorkerCommand::Start { .. }, WorkerCommand::Stop]
        ));

        tx.send(WorkerCommand::Loop { grid }).expect("send");
        drop(tx);
        let drained = drain_pending_commands(&rx);
        assert_eq!(drained.commands.len(), 1);
        assert!(drained.disconnected);
    }

    #[test]
    fn command_debug_omits_cells() {
        let command = WorkerCommand::Loop {
            grid: Grid::new(64).expect("grid"),
        };
        assert_eq!(format!("{command:?}"), "Loop { size: 64 }");
    }
}
