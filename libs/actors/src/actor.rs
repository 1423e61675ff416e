//! Actor runtime
//!
//! An actor owns an identity, a connection and a state machine. Once
//! started it runs two tasks:
//!
//! - a reader that validates inbound frames, resolves replies against the
//!   correlation store and queues Tell/Ask envelopes addressed to this actor
//! - a dispatcher that drains that mailbox one envelope at a time through
//!   the transition table
//!
//! Replies never enter the mailbox, so a handler awaiting an `ask` is
//! resolved while the dispatcher is still busy with it.

use crate::capacity::Capacity;
use crate::error::{ActorError, CapacityError, Result};
use crate::future::FutureStore;
use crate::protocol::{self, Envelope, MessageKind, Output};
use crate::router::{RegisterPayload, Router, RoutingLogic, REGISTER_TOPIC, UNREGISTER_TOPIC};
use crate::transition::{State, Transition, TransitionTable};
use futures::future::{BoxFuture, FutureExt};
use network::{Connection, InboundFrames};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

type StartHook = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<()>> + Send + Sync>;
type EnvelopeHook<S> = Arc<dyn Fn(&Envelope, &S) + Send + Sync>;

/// Lifecycle and observability hooks
struct Hooks<S> {
    on_start: Option<StartHook>,
    on_receive: Option<EnvelopeHook<S>>,
    on_unknown: Option<EnvelopeHook<S>>,
}

impl<S> Default for Hooks<S> {
    fn default() -> Self {
        Self {
            on_start: None,
            on_receive: None,
            on_unknown: None,
        }
    }
}

/// An actor before it is started
pub struct Actor<S: State> {
    id: String,
    connection: Arc<dyn Connection>,
    default_state: S,
    transitions: TransitionTable<S>,
    router: Option<Arc<Router>>,
    hooks: Hooks<S>,
}

impl<S: State> Actor<S> {
    pub fn new(id: impl Into<String>, connection: Arc<dyn Connection>, default_state: S) -> Self {
        Self {
            id: id.into(),
            connection,
            default_state,
            transitions: TransitionTable::new(),
            router: None,
            hooks: Hooks::default(),
        }
    }

    /// Actor whose `tell` and `broadcast` go through a routing table
    pub fn with_router(
        id: impl Into<String>,
        connection: Arc<dyn Connection>,
        default_state: S,
        logic: impl RoutingLogic + 'static,
    ) -> Self {
        let mut actor = Self::new(id, connection, default_state);
        actor.router = Some(Arc::new(Router::new(logic)));
        actor
    }

    /// Router that also accepts `register` / `unregister` messages, so other
    /// actors can enroll themselves over the wire
    pub fn group_router(
        id: impl Into<String>,
        connection: Arc<dyn Connection>,
        default_state: S,
        logic: impl RoutingLogic + 'static,
    ) -> Self {
        let mut actor = Self::with_router(id, connection, default_state, logic);
        actor.add_transitions([
            Transition::new(REGISTER_TOPIC).typed_handler(
                |ctx: Context, _envelope, payload: RegisterPayload| async move {
                    if let Some(router) = ctx.router() {
                        router.register(&payload.proxy, &payload.actor_ref);
                    }
                    Ok(())
                },
            ),
            Transition::new(UNREGISTER_TOPIC).typed_handler(
                |ctx: Context, _envelope, payload: RegisterPayload| async move {
                    if let Some(router) = ctx.router() {
                        router.unregister(&payload.proxy, &payload.actor_ref);
                    }
                    Ok(())
                },
            ),
        ]);
        actor
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Routing table, for static registrations before `start`
    pub fn router(&self) -> Option<&Arc<Router>> {
        self.router.as_ref()
    }

    pub fn add_transition(&mut self, transition: Transition<S>) -> &mut Self {
        self.transitions.add(transition);
        self
    }

    /// Register several transitions, in order
    pub fn add_transitions(
        &mut self,
        transitions: impl IntoIterator<Item = Transition<S>>,
    ) -> &mut Self {
        for transition in transitions {
            self.transitions.add(transition);
        }
        self
    }

    /// Runs after the connection is up and before the first dispatch
    pub fn on_start<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.on_start = Some(Arc::new(move |ctx: Context| hook(ctx).boxed()));
        self
    }

    /// Observes every envelope before transition resolution
    pub fn on_receive<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Envelope, &S) + Send + Sync + 'static,
    {
        self.hooks.on_receive = Some(Arc::new(hook));
        self
    }

    /// Replaces the default log line for envelopes no transition accepts
    pub fn on_unknown<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Envelope, &S) + Send + Sync + 'static,
    {
        self.hooks.on_unknown = Some(Arc::new(hook));
        self
    }

    /// Connect, run `on_start`, then begin dispatching.
    ///
    /// Frames arriving while `on_start` runs are buffered; replies among them
    /// are resolved immediately so `on_start` may itself `ask`.
    pub async fn start(self) -> Result<ActorHandle<S>> {
        let Actor {
            id,
            connection,
            default_state,
            transitions,
            router,
            hooks,
        } = self;

        connection.start().await?;
        info!(actor_id = %id, connection = %connection.name(), "Actor connected");

        let inbound = match connection.subscribe() {
            Ok(inbound) => inbound,
            Err(e) => {
                error!(actor_id = %id, error = %e, "Actor failed to subscribe");
                if let Err(close_err) = connection.close().await {
                    debug!(actor_id = %id, error = %close_err, "Close after failed subscribe");
                }
                return Err(e.into());
            }
        };
        let ctx = Context::new(id.clone(), Arc::clone(&connection), router);

        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_inbound(ctx.clone(), inbound, mailbox_tx));

        if let Some(hook) = &hooks.on_start {
            if let Err(e) = hook(ctx.clone()).await {
                error!(actor_id = %id, error = %e, "Actor failed to start");
                reader.abort();
                if let Err(close_err) = connection.close().await {
                    debug!(actor_id = %id, error = %close_err, "Close after failed start");
                }
                return Err(e);
            }
        }

        let (state_tx, state_rx) = watch::channel(ActorSnapshot {
            state: default_state.clone(),
            dispatched: 0,
        });
        let dispatcher = Dispatcher {
            ctx: ctx.clone(),
            state: default_state,
            dispatched: 0,
            transitions,
            hooks,
            mailbox: mailbox_rx,
            state_tx,
        };
        let dispatcher = tokio::spawn(dispatcher.run());

        debug!(actor_id = %id, "Actor started, entering dispatch loop");
        Ok(ActorHandle {
            ctx,
            state_rx,
            reader,
            dispatcher,
        })
    }
}

impl<S: State> fmt::Debug for Actor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("default_state", &self.default_state)
            .field("transitions", &self.transitions.len())
            .field("router", &self.router.is_some())
            .finish_non_exhaustive()
    }
}

/// Reader stage: frames in, mailbox out
async fn read_inbound(ctx: Context, mut inbound: InboundFrames, mailbox: mpsc::UnboundedSender<Envelope>) {
    while let Some(frame) = inbound.recv().await {
        let envelope = match protocol::validate(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(actor_id = %ctx.id(), error = %e, "Error parsing message, dropping frame");
                continue;
            }
        };

        match envelope.kind() {
            MessageKind::Reply => {
                let corr_id = envelope.reply_to.clone().unwrap_or_default();
                if !ctx.inner.futures.resolve(&corr_id, envelope) {
                    trace!(actor_id = %ctx.id(), corr_id = %corr_id, "Dropping reply with unknown correlation id");
                }
            }
            _ if envelope.to != ctx.id() => {
                trace!(actor_id = %ctx.id(), to = %envelope.to, topic = %envelope.topic, "Dropping message addressed elsewhere");
            }
            _ => {
                if mailbox.send(envelope).is_err() {
                    break;
                }
            }
        }
    }
    debug!(actor_id = %ctx.id(), "Inbound stream ended");
}

/// Dispatch stage: one envelope at a time through the state machine
struct Dispatcher<S: State> {
    ctx: Context,
    state: S,
    dispatched: u64,
    transitions: TransitionTable<S>,
    hooks: Hooks<S>,
    mailbox: mpsc::UnboundedReceiver<Envelope>,
    state_tx: watch::Sender<ActorSnapshot<S>>,
}

impl<S: State> Dispatcher<S> {
    async fn run(mut self) {
        while let Some(envelope) = self.mailbox.recv().await {
            self.dispatch(envelope).await;
            self.dispatched += 1;
            self.state_tx.send_replace(ActorSnapshot {
                state: self.state.clone(),
                dispatched: self.dispatched,
            });
        }
        info!(actor_id = %self.ctx.id(), state = ?self.state, "Actor stopped");
    }

    async fn dispatch(&mut self, envelope: Envelope) {
        if let Some(hook) = &self.hooks.on_receive {
            hook(&envelope, &self.state);
        }

        let Some(transition) = self.transitions.select(&self.state, &envelope).cloned() else {
            match &self.hooks.on_unknown {
                Some(hook) => hook(&envelope, &self.state),
                None => info!(
                    actor_id = %self.ctx.id(),
                    topic = %envelope.topic,
                    state = ?self.state,
                    "Received unknown message"
                ),
            }
            return;
        };

        let topic = envelope.topic.clone();
        let start = Instant::now();
        match transition.handle(self.ctx.clone(), envelope).await {
            Ok(()) => {
                if let Some(next) = transition.to_state() {
                    if *next != self.state {
                        debug!(
                            actor_id = %self.ctx.id(),
                            topic = %topic,
                            from = ?self.state,
                            to = ?next,
                            "State transition"
                        );
                    }
                    self.state = next.clone();
                }
            }
            Err(e) => {
                error!(
                    actor_id = %self.ctx.id(),
                    topic = %topic,
                    state = ?self.state,
                    error = %e,
                    error_category = e.category(),
                    processing_duration_us = start.elapsed().as_micros() as u64,
                    "Transition handler failed"
                );
            }
        }
    }
}

/// State published after every dispatched envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSnapshot<S> {
    pub state: S,
    /// Envelopes taken through the state machine so far
    pub dispatched: u64,
}

/// Running actor
pub struct ActorHandle<S: State> {
    ctx: Context,
    state_rx: watch::Receiver<ActorSnapshot<S>>,
    reader: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl<S: State> ActorHandle<S> {
    pub fn id(&self) -> &str {
        self.ctx.id()
    }

    /// Capability handle for sending on behalf of this actor
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn state(&self) -> S {
        self.state_rx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> ActorSnapshot<S> {
        self.state_rx.borrow().clone()
    }

    /// Receiver of state snapshots
    pub fn watch(&self) -> watch::Receiver<ActorSnapshot<S>> {
        self.state_rx.clone()
    }

    /// Wait until the actor reaches `state`
    pub async fn wait_for_state(&self, state: &S) -> Result<()> {
        self.wait_until(|snapshot| snapshot.state == *state).await
    }

    /// Wait until at least `count` envelopes were dispatched
    pub async fn wait_for_dispatched(&self, count: u64) -> Result<()> {
        self.wait_until(|snapshot| snapshot.dispatched >= count).await
    }

    async fn wait_until(&self, condition: impl FnMut(&ActorSnapshot<S>) -> bool) -> Result<()> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(condition)
            .await
            .map(|_| ())
            .map_err(|_| ActorError::Stopped(self.ctx.id().to_string()))
    }

    pub fn is_running(&self) -> bool {
        !self.dispatcher.is_finished()
    }

    /// Stop both tasks and close the connection. Pending asks are not
    /// settled here.
    pub async fn stop(self) -> Result<()> {
        self.reader.abort();
        self.dispatcher.abort();
        self.ctx.inner.connection.close().await?;
        info!(actor_id = %self.ctx.id(), "Actor stopped");
        Ok(())
    }
}

impl<S: State> fmt::Debug for ActorHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("id", &self.ctx.id())
            .field("snapshot", &*self.state_rx.borrow())
            .finish()
    }
}

struct ContextInner {
    id: String,
    connection: Arc<dyn Connection>,
    futures: FutureStore,
    router: Option<Arc<Router>>,
}

/// What handlers and hooks can do on behalf of their actor
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    fn new(id: String, connection: Arc<dyn Connection>, router: Option<Arc<Router>>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id,
                connection,
                futures: FutureStore::new(),
                router,
            }),
        }
    }

    /// This actor's identity
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn router(&self) -> Option<&Arc<Router>> {
        self.inner.router.as_ref()
    }

    /// Asks still waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.inner.futures.len()
    }

    async fn send(&self, envelope: &Envelope) -> Result<()> {
        let frame = envelope.to_frame()?;
        self.inner.connection.send(frame).await?;
        Ok(())
    }

    /// Fire-and-forget. With a router, a target that has registered
    /// candidates is rewritten to the candidate the routing logic picks.
    pub async fn tell<P: Serialize>(&self, output: Output<P>) -> Result<()> {
        let mut envelope = output.into_envelope(self.id())?;
        if let Some(selected) = self.router().and_then(|router| router.route(&envelope.to)) {
            trace!(actor_id = %self.id(), target = %envelope.to, selected = %selected, "Routing tell");
            envelope.to = selected;
        }
        self.send(&envelope).await
    }

    /// Send to every candidate registered for `output.to`, in table order,
    /// or directly when none are registered. Every candidate is attempted;
    /// the first failure is returned.
    pub async fn broadcast<P: Serialize>(&self, output: Output<P>) -> Result<()> {
        let envelope = output.into_envelope(self.id())?;
        let candidates = self
            .router()
            .map(|router| router.candidates(&envelope.to))
            .unwrap_or_default();
        if candidates.is_empty() {
            return self.send(&envelope).await;
        }

        let mut first_error = None;
        for candidate in candidates {
            let copy = Envelope {
                to: candidate,
                ..envelope.clone()
            };
            if let Err(e) = self.send(&copy).await {
                warn!(actor_id = %self.id(), to = %copy.to, error = %e, "Broadcast delivery failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Send an Ask with a fresh correlation id and wait for its reply
    pub async fn ask<P: Serialize>(&self, output: Output<P>, timeout: Option<Duration>) -> Result<Envelope> {
        self.ask_with_id(output, timeout, protocol::gen_corr_id()).await
    }

    /// Send an Ask correlated by `corr_id`. An empty id fails immediately.
    pub async fn ask_with_id<P: Serialize>(
        &self,
        output: Output<P>,
        timeout: Option<Duration>,
        corr_id: impl Into<String>,
    ) -> Result<Envelope> {
        let corr_id = corr_id.into();
        let envelope = Envelope::ask(output.into_envelope(self.id())?, Some(corr_id.clone()));
        let pending = self.inner.futures.register(&corr_id, timeout)?;

        if let Err(e) = self.send(&envelope).await {
            self.inner.futures.reject(&corr_id, ActorError::Abandoned(corr_id.clone()));
            return Err(e);
        }
        trace!(actor_id = %self.id(), corr_id = %corr_id, to = %envelope.to, "Ask sent");
        pending.await
    }

    /// Reply to `ask` with `payload` and `status` (200 when `None`)
    pub async fn respond<P: Serialize>(&self, ask: &Envelope, payload: P, status: Option<u16>) -> Result<()> {
        if ask.corr_id().map_or(true, str::is_empty) {
            return Err(ActorError::MissingCorrelationId);
        }
        let payload = serde_json::to_value(payload)?;
        self.send(&Envelope::reply(ask, payload, status)).await
    }

    /// Run a capacity after checking its availability
    pub async fn call<C: Capacity + ?Sized>(
        &self,
        capacity: &C,
        input: C::Input,
    ) -> std::result::Result<C::Output, CapacityError> {
        if !capacity.pre_check() {
            warn!(actor_id = %self.id(), capacity = %capacity.name(), "Capacity unavailable");
            return Err(CapacityError::unavailable(capacity.name()));
        }
        capacity.handle(input).await
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("connection", &self.inner.connection.name())
            .field("pending", &self.inner.futures.len())
            .finish()
    }
}
