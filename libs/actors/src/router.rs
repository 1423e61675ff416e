//! Router
//!
//! A routing table from logical target name to registered candidate actor
//! ids, plus the strategy that picks a candidate per send. The table is
//! owned by one actor and reachable from its [`Context`](crate::Context).

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::protocol::Output;

/// Topic a group router registers candidates on
pub const REGISTER_TOPIC: &str = "register";
/// Topic a group router unregisters candidates on
pub const UNREGISTER_TOPIC: &str = "unregister";

/// Candidate selection strategy
pub trait RoutingLogic: Send + Sync + fmt::Debug {
    /// Pick one of `candidates` for a message addressed to `to`. Only called
    /// with a non-empty candidate list.
    fn select(&self, to: &str, candidates: &[String]) -> Option<String>;
}

/// Cycles through candidates with one cursor shared by every target
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutingLogic for RoundRobin {
    fn select(&self, _to: &str, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock();
        // The list may have shrunk since the cursor last advanced
        let index = *cursor % candidates.len();
        *cursor = (index + 1) % candidates.len();
        Some(candidates[index].clone())
    }
}

/// Uniform random pick
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl RoutingLogic for Random {
    fn select(&self, _to: &str, candidates: &[String]) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..candidates.len());
        Some(candidates[index].clone())
    }
}

/// Picks the candidate with the lowest reported cost.
///
/// Costs are updated from outside (e.g. from status messages reporting
/// queue length times average processing time). Candidates without a
/// reported cost count as idle. Clones share the same cost table.
#[derive(Debug, Default, Clone)]
pub struct LoadAware {
    costs: Arc<RwLock<HashMap<String, f64>>>,
}

impl LoadAware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, candidate: impl Into<String>, cost: f64) {
        self.costs.write().insert(candidate.into(), cost);
    }

    pub fn forget(&self, candidate: &str) {
        self.costs.write().remove(candidate);
    }

    pub fn cost(&self, candidate: &str) -> Option<f64> {
        self.costs.read().get(candidate).copied()
    }
}

impl RoutingLogic for LoadAware {
    fn select(&self, to: &str, candidates: &[String]) -> Option<String> {
        let costs = self.costs.read();
        let mut best: Option<(&String, f64)> = None;
        for candidate in candidates {
            // Unreported candidates are idle; a NaN report ranks last
            let cost = match costs.get(candidate) {
                Some(cost) if cost.is_nan() => f64::INFINITY,
                Some(cost) => *cost,
                None => 0.0,
            };
            match best {
                Some((_, min)) if cost >= min => {}
                _ => best = Some((candidate, cost)),
            }
        }
        let (selected, cost) = best?;
        debug!(to = %to, selected = %selected, cost, "Selected least loaded candidate");
        Some(selected.clone())
    }
}

/// Routing table plus strategy
pub struct Router {
    routes: RwLock<HashMap<String, Vec<String>>>,
    logic: Box<dyn RoutingLogic>,
}

impl Router {
    pub fn new(logic: impl RoutingLogic + 'static) -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            logic: Box::new(logic),
        }
    }

    /// Append `proxy` to the candidates of `target`
    pub fn register(&self, target: &str, proxy: &str) {
        let mut routes = self.routes.write();
        let candidates = routes.entry(target.to_string()).or_default();
        candidates.push(proxy.to_string());
        debug!(target = %target, proxy = %proxy, candidates = candidates.len(), "Registered route");
    }

    /// Remove the first occurrence of `proxy` under `target`. Absent pairs
    /// are ignored; returns whether something was removed.
    pub fn unregister(&self, target: &str, proxy: &str) -> bool {
        let mut routes = self.routes.write();
        let Some(candidates) = routes.get_mut(target) else {
            return false;
        };
        let Some(index) = candidates.iter().position(|c| c == proxy) else {
            return false;
        };
        candidates.remove(index);
        if candidates.is_empty() {
            routes.remove(target);
        }
        debug!(target = %target, proxy = %proxy, "Unregistered route");
        true
    }

    /// Snapshot of the candidates for `target`, in registration order
    pub fn candidates(&self, target: &str) -> Vec<String> {
        self.routes.read().get(target).cloned().unwrap_or_default()
    }

    /// Pick a candidate for `target`; `None` when nothing is registered
    pub fn route(&self, target: &str) -> Option<String> {
        let candidates = self.candidates(target);
        if candidates.is_empty() {
            return None;
        }
        self.logic.select(target, &candidates)
    }

    /// Targets with at least one candidate
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.routes.read().keys().cloned().collect();
        targets.sort();
        targets
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &*self.routes.read())
            .field("logic", &self.logic)
            .finish()
    }
}

/// Payload of group `register` / `unregister` messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayload {
    /// Actor joining or leaving the group
    #[serde(rename = "actorRef")]
    pub actor_ref: String,
    /// Logical target the actor serves
    pub proxy: String,
}

/// Message asking `router` to add `actor_ref` as a candidate for `proxy`
pub fn register_output(
    router: impl Into<String>,
    proxy: impl Into<String>,
    actor_ref: impl Into<String>,
) -> Output<RegisterPayload> {
    Output::new(
        router,
        REGISTER_TOPIC,
        RegisterPayload {
            actor_ref: actor_ref.into(),
            proxy: proxy.into(),
        },
    )
}

/// Message asking `router` to drop `actor_ref` from `proxy`
pub fn unregister_output(
    router: impl Into<String>,
    proxy: impl Into<String>,
    actor_ref: impl Into<String>,
) -> Output<RegisterPayload> {
    Output::new(
        router,
        UNREGISTER_TOPIC,
        RegisterPayload {
            actor_ref: actor_ref.into(),
            proxy: proxy.into(),
        },
    )
}
