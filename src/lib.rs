//! # callflow
//!
//! State table-based call flow engine for stateless telephony webhooks.
//!
//! A telephony provider drives a call by posting discrete requests (status,
//! keypad digits, recording URLs); this crate remembers where each call is
//! in a larger conversation graph and answers every request with the next
//! rendered instruction.
//!
//! The core is four pieces:
//!
//! - [`machine`] — per-application state machine definitions and the
//!   [`RuleEngine`] that resolves states and transitions over them, with
//!   ordered first-match rule dispatch, cross-machine delegation, and
//!   recovery hooks at the transition boundary.
//! - [`session`] — the concurrent [`SessionStore`] giving each call id
//!   continuity across requests, with per-call serialization and an
//!   optional idle-session sweeper.
//! - [`processor`] — the [`CallProcessor`] that ties one inbound request to
//!   its session and drives exactly one transition.
//! - [`events`] — the fire-and-forget [`EventBus`] carrying lifecycle
//!   events to subscribers off the processing path.
//!
//! Rendering into the provider's wire format happens behind the
//! [`MarkupRenderer`] seam; transport, persistence, and request
//! authentication live outside this crate.
//!
//! ```no_run
//! use callflow::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main] async fn main() -> Result<()> {
//! let machine = MachineBuilder::new("ivr", "greeting")
//!     .state("greeting", |_input, _options| {
//!         Ok(vec![Directive::gather(
//!             1,
//!             5,
//!             vec![Directive::say("Press 1 for English")],
//!         )])
//!     })
//!     .state("english", |_input, _options| {
//!         Ok(vec![Directive::say("Hello!")])
//!     })
//!     .rule(
//!         RulePattern::on("greeting").when_input("Digits", "1"),
//!         NextAction::goto("english"),
//!     )
//!     .rule(RulePattern::on("greeting"), NextAction::goto("greeting"))
//!     .build();
//!
//! let registry = Arc::new(MachineRegistry::new());
//! registry.register(machine);
//! let processor = CallProcessor::new(registry, Arc::new(PlainTextRenderer));
//! processor.events().subscribe(Arc::new(EventLogger)).await;
//!
//! let input = CallInput::new("CA1", CallStatus::InProgress).with_field("Digits", "1");
//! let outcome = processor.process(&"ivr".into(), input, Options::new()).await?;
//! println!("{}", outcome.state.rendered());
//! # Ok(()) }
//! ```

pub mod errors;
pub mod events;
pub mod machine;
pub mod processor;
pub mod render;
pub mod session;
pub mod types;

pub use errors::{CallFlowError, Result};
pub use events::{CallEvent, CallEventHandler, EventBus, EventLogger};
pub use machine::{
    FieldMatch, MachineBuilder, MachineRegistry, MatchPredicate, NextAction, Recovery, Resolution,
    RuleEngine, RulePattern, StateMachine, TransitionRule,
};
pub use processor::{CallProcessor, ProcessedCall};
pub use render::{Directive, MarkupRenderer, PlainTextRenderer};
pub use session::{Session, SessionStats, SessionStore};
pub use types::{
    merge_options, options_from, CallId, CallInput, CallStatus, MachineId, Options, State,
    StateName,
};
