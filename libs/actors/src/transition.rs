//! Transition model
//!
//! A transition is `(topic, from?, to?, guard?, handler?)`. Without `from`
//! it is global; without `to` it is a self-loop; without a guard it accepts
//! messages whose topic equals its own.

use crate::actor::Context;
use crate::error::{ActorError, Result};
use crate::protocol::Envelope;
use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Actor state: any small value type
pub trait State: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> State for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Boxed handler future
pub type HandlerFuture = BoxFuture<'static, Result<()>>;

type Guard = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;
type Handler = Arc<dyn Fn(Context, Envelope) -> HandlerFuture + Send + Sync>;

/// One rule of an actor's state machine
#[derive(Clone)]
pub struct Transition<S: State> {
    topic: String,
    from: Option<S>,
    to: Option<S>,
    guard: Option<Guard>,
    handler: Option<Handler>,
}

impl<S: State> Transition<S> {
    /// Global self-loop on `topic` with no handler
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            from: None,
            to: None,
            guard: None,
            handler: None,
        }
    }

    /// Only consider this transition while in `state`
    pub fn from(mut self, state: S) -> Self {
        self.from = Some(state);
        self
    }

    /// Move to `state` after the handler succeeds
    pub fn to(mut self, state: S) -> Self {
        self.to = Some(state);
        self
    }

    /// Replace the topic-equality check with a custom predicate
    pub fn guard<G>(mut self, guard: G) -> Self
    where
        G: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Guard on the decoded payload, in addition to the topic. Frames whose
    /// payload does not decode into `P` are not accepted.
    pub fn typed_guard<P, G>(self, guard: G) -> Self
    where
        P: DeserializeOwned,
        G: Fn(&P) -> bool + Send + Sync + 'static,
    {
        let topic = self.topic.clone();
        self.guard(move |envelope: &Envelope| {
            envelope.topic == topic
                && envelope
                    .payload_as::<P>()
                    .map(|payload| guard(&payload))
                    .unwrap_or(false)
        })
    }

    pub fn handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Context, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx: Context, envelope: Envelope| -> HandlerFuture {
            handler(ctx, envelope).boxed()
        }));
        self
    }

    /// Handler that receives the payload decoded into `P`. A payload that
    /// does not decode fails the handler with [`ActorError::Payload`].
    pub fn typed_handler<P, F, Fut>(mut self, handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(Context, Envelope, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx: Context, envelope: Envelope| -> HandlerFuture {
            match envelope.payload_as::<P>() {
                Ok(payload) => handler(ctx, envelope, payload).boxed(),
                Err(e) => future::ready(Err(ActorError::Payload(e))).boxed(),
            }
        }));
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn from_state(&self) -> Option<&S> {
        self.from.as_ref()
    }

    pub fn to_state(&self) -> Option<&S> {
        self.to.as_ref()
    }

    pub fn is_global(&self) -> bool {
        self.from.is_none()
    }

    pub fn accept(&self, envelope: &Envelope) -> bool {
        match &self.guard {
            Some(guard) => guard(envelope),
            None => envelope.topic == self.topic,
        }
    }

    /// Run the handler; a transition without one succeeds immediately
    pub async fn handle(&self, ctx: Context, envelope: Envelope) -> Result<()> {
        match &self.handler {
            Some(handler) => handler(ctx, envelope).await,
            None => Ok(()),
        }
    }
}

impl<S: State> fmt::Debug for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("topic", &self.topic)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// Per-state and global transitions, in registration order
#[derive(Debug, Clone)]
pub struct TransitionTable<S: State> {
    by_state: HashMap<S, Vec<Transition<S>>>,
    global: Vec<Transition<S>>,
}

impl<S: State> Default for TransitionTable<S> {
    fn default() -> Self {
        Self {
            by_state: HashMap::new(),
            global: Vec::new(),
        }
    }
}

impl<S: State> TransitionTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, transition: Transition<S>) {
        match transition.from.clone() {
            Some(state) => self.by_state.entry(state).or_default().push(transition),
            None => self.global.push(transition),
        }
    }

    /// Transitions considered in `state`: that state's list, then the
    /// global list
    pub fn candidates<'a>(&'a self, state: &S) -> impl Iterator<Item = &'a Transition<S>> + 'a {
        self.by_state
            .get(state)
            .into_iter()
            .flatten()
            .chain(self.global.iter())
    }

    /// First candidate accepting `envelope`
    pub fn select(&self, state: &S, envelope: &Envelope) -> Option<&Transition<S>> {
        self.candidates(state).find(|t| t.accept(envelope))
    }

    /// State after `envelope`, assuming the selected handler succeeds
    pub fn next_state(&self, state: &S, envelope: &Envelope) -> S {
        self.select(state, envelope)
            .and_then(|t| t.to_state().cloned())
            .unwrap_or_else(|| state.clone())
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.by_state.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
