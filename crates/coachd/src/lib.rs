//! coachd - resilient AI orchestration for interview coaching
//!
//! - `gateway`: multi-provider routing with circuit breakers, timeouts and a response cache
//! - `evaluator`: STAR scoring of answers, AI first with a deterministic heuristic fallback
//! - `orchestrator`: the per-session conversation state machine
//! - `lifecycle`: timeout, abandonment and archival sweeping
//! - `storage`, `notifier`: collaborators the core writes through

pub mod clock;
pub mod evaluator;
pub mod gateway;
pub mod lifecycle;
pub mod notifier;
pub mod orchestrator;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use evaluator::{ResponseEvaluator, RubricContext};
pub use gateway::{AiGateway, GatewayError, GenerateRequest, Generation};
pub use lifecycle::{RecoveryOutcome, SessionLifecycleManager, SweepObserver, SweepReport};
pub use notifier::{BroadcastNotifier, NoopNotifier, Notifier, SessionEvent, SessionEventKind};
pub use orchestrator::{ConversationState, SessionOrchestrator, TurnOutcome};
pub use storage::{InMemoryStorage, Storage};
