//! Finite-state-machine actors over a shared message bus
//!
//! Each actor owns an identity, a state machine and a connection. Actors
//! exchange fire-and-forget `tell`s and correlated `ask`/reply pairs using a
//! topic-addressed JSON envelope, and can be grouped behind routers that
//! distribute work across dynamically registered candidates.
//!
//! # Architecture
//!
//! ```text
//!   Connection ──frames──▶ reader task ──┬─ Reply ──▶ FutureStore (resolve)
//!                                        ├─ to != id ─▶ dropped
//!                                        └─ Tell/Ask ─▶ mailbox
//!                                                        │
//!                              dispatcher task ◀─────────┘
//!                              (one envelope at a time)
//!                                │
//!                                ▼
//!                  TransitionTable: state list, then global list,
//!                  first accept wins, commit `to` on success
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ditto_actors::{Actor, Context, Transition};
//! use network::LocalBus;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum Door { Open, Closed }
//!
//! # async fn run() -> ditto_actors::Result<()> {
//! let bus = LocalBus::new();
//! let mut door = Actor::new("org.i2ec:door", Arc::new(bus.connect("org.i2ec:door")), Door::Closed);
//! door.add_transitions([
//!     Transition::new("open").from(Door::Closed).to(Door::Open),
//!     Transition::new("close").from(Door::Open).to(Door::Closed),
//!     Transition::new("status").handler(|ctx: Context, msg| async move {
//!         ctx.respond(&msg, "unknown", None).await
//!     }),
//! ]);
//! let handle = door.start().await?;
//! handle.wait_for_state(&Door::Open).await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod capacity;
pub mod error;
pub mod future;
pub mod protocol;
pub mod router;
pub mod transition;

pub use actor::{Actor, ActorHandle, ActorSnapshot, Context};
pub use capacity::{capacity_fn, Capacity, CapacityExt, FnCapacity};
pub use error::{ActorError, CapacityError, ParseError, Result};
pub use future::{FutureStore, PendingReply};
pub use protocol::{gen_corr_id, validate, Envelope, MessageKind, Output, DEFAULT_REPLY_STATUS};
pub use router::{
    register_output, unregister_output, LoadAware, Random, RegisterPayload, RoundRobin, Router,
    RoutingLogic,
};
pub use transition::{State, Transition, TransitionTable};
