//! # strand-runner
//!
//! Lifecycle orchestration for the one-shot strand clients.
//!
//! `strand-trade` connects one authenticated session, waits for it to become
//! ready, runs exactly one command, and closes the connection.
//! `strand-stream` prints a market stream until interrupted.
//!
//! ## Components
//!
//! | Component               | Module         | Role                                            |
//! |-------------------------|----------------|-------------------------------------------------|
//! | `CommandRequest`        | `command`      | validated command built from CLI arguments      |
//! | `CommandDispatcher`     | `command`      | runs the command once, after readiness          |
//! | `ConnectionOrchestrator`| `orchestrator` | connect → await ready → dispatch, plus watcher  |
//! | `StateChangeReporter`   | `reporter`     | logs state transitions and errors               |
//! | `ShutdownCoordinator`   | `shutdown`     | interrupt vs. outcome race, single close        |
//! | outcome slot            | `outcome`      | first-writer-wins handoff of the final outcome  |

pub mod app;
pub mod cli;
pub mod command;
pub mod orchestrator;
pub mod outcome;
pub mod reporter;
pub mod shutdown;
pub mod stream;

pub use command::{Command, CommandDispatcher, CommandRequest, Mode, Report};
pub use orchestrator::ConnectionOrchestrator;
pub use outcome::{Outcome, OutcomeReceiver, OutcomeSender, outcome_slot};
pub use reporter::{PendingError, StateChangeReporter};
pub use shutdown::{ShutdownCoordinator, ShutdownPhase};
