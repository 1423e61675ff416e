//! State machine resolution through a running actor

use ditto_actors::{Actor, Context, Envelope, Transition, TransitionTable};
use network::test_utils::RecordingConnection;
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Phase {
    Idle,
    Busy,
    Done,
}

fn frame(to: &str, topic: &str) -> String {
    json!({"from": "tester", "to": to, "topic": topic, "payload": {}}).to_string()
}

fn phase_transitions() -> Vec<Transition<Phase>> {
    vec![
        Transition::new("start").from(Phase::Idle).to(Phase::Busy),
        Transition::new("finish").from(Phase::Busy).to(Phase::Done),
        Transition::new("start").from(Phase::Busy),
        Transition::new("reset").to(Phase::Idle),
        // Shadowed in Busy by the state-scoped "finish"
        Transition::new("finish").to(Phase::Idle),
    ]
}

/// Feed `topics` to a fresh actor; returns every state it passed through
fn replay(topics: &[&str]) -> Vec<Phase> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let conn = Arc::new(RecordingConnection::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut actor = Actor::new("worker", conn.clone(), Phase::Idle);
        actor.add_transitions(phase_transitions());
        let recorder = Arc::clone(&seen);
        actor.on_receive(move |_envelope, state| recorder.lock().push(*state));

        let handle = actor.start().await.unwrap();
        for topic in topics {
            conn.inject(frame("worker", topic));
        }
        handle.wait_for_dispatched(topics.len() as u64).await.unwrap();

        let mut states = seen.lock().clone();
        states.push(handle.state());
        states
    })
}

/// Same walk computed from the table alone
fn expected(topics: &[&str]) -> Vec<Phase> {
    let mut table = TransitionTable::new();
    for transition in phase_transitions() {
        table.add(transition);
    }

    let mut state = Phase::Idle;
    let mut states = vec![state];
    for topic in topics {
        state = table.next_state(&state, &Envelope::tell("tester", "worker", *topic, json!({})));
        states.push(state);
    }
    states
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn fsm_replay_is_deterministic(
        topics in prop::collection::vec(prop::sample::select(vec!["start", "finish", "reset", "noise"]), 0..30)
    ) {
        let first = replay(&topics);
        let second = replay(&topics);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first, expected(&topics));
    }
}

#[tokio::test]
async fn first_registered_transition_wins() {
    let conn = Arc::new(RecordingConnection::new());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let mut actor = Actor::new("worker", conn.clone(), Phase::Idle);
    let counter = Arc::clone(&first);
    actor.add_transition(Transition::new("go").from(Phase::Idle).to(Phase::Busy).handler(
        move |_ctx: Context, _env| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        },
    ));
    let counter = Arc::clone(&second);
    actor.add_transition(Transition::new("go").from(Phase::Idle).to(Phase::Done).handler(
        move |_ctx: Context, _env| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        },
    ));

    let handle = actor.start().await.unwrap();
    conn.inject(frame("worker", "go"));
    handle.wait_for_dispatched(1).await.unwrap();

    assert_eq!(handle.state(), Phase::Busy);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn state_scoped_transition_beats_earlier_global() {
    let conn = Arc::new(RecordingConnection::new());
    let mut actor = Actor::new("worker", conn.clone(), Phase::Idle);
    actor.add_transitions([
        Transition::new("go").to(Phase::Done),
        Transition::new("go").from(Phase::Idle).to(Phase::Busy),
    ]);

    let handle = actor.start().await.unwrap();
    conn.inject(frame("worker", "go"));
    handle.wait_for_state(&Phase::Busy).await.unwrap();

    // From Busy only the global transition is left
    conn.inject(frame("worker", "go"));
    handle.wait_for_state(&Phase::Done).await.unwrap();
}

#[tokio::test]
async fn mis_addressed_tell_has_no_effect() {
    let conn = Arc::new(RecordingConnection::new());
    let received = Arc::new(AtomicUsize::new(0));

    let mut actor = Actor::new("Y", conn.clone(), Phase::Idle);
    actor.add_transition(
        Transition::new("go")
            .to(Phase::Busy)
            .handler(|ctx: Context, _env| async move {
                ctx.tell(ditto_actors::Output::new("observer", "went", json!({}))).await
            }),
    );
    let counter = Arc::clone(&received);
    actor.on_receive(move |_envelope, _state| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = actor.start().await.unwrap();
    conn.inject(frame("X", "go"));
    // Addressed frame that no transition accepts
    conn.inject(frame("Y", "ping"));
    handle.wait_for_dispatched(1).await.unwrap();

    assert_eq!(handle.state(), Phase::Idle);
    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(conn.sent_count(), 0);
}

#[tokio::test]
async fn unknown_hook_sees_unmatched_envelopes() {
    let conn = Arc::new(RecordingConnection::new());
    let unknown = Arc::new(Mutex::new(Vec::new()));

    let mut actor = Actor::new("worker", conn.clone(), Phase::Idle);
    actor.add_transition(Transition::new("finish").from(Phase::Busy).to(Phase::Done));
    let sink = Arc::clone(&unknown);
    actor.on_unknown(move |envelope, state| sink.lock().push((envelope.topic.clone(), *state)));

    let handle = actor.start().await.unwrap();
    conn.inject(frame("worker", "finish"));
    handle.wait_for_dispatched(1).await.unwrap();

    assert_eq!(handle.state(), Phase::Idle);
    assert_eq!(*unknown.lock(), vec![("finish".to_string(), Phase::Idle)]);
}

#[tokio::test]
async fn dispatch_is_serialized_in_arrival_order() {
    let conn = Arc::new(RecordingConnection::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut actor = Actor::new("worker", conn.clone(), Phase::Idle);
    let entries = Arc::clone(&log);
    actor.add_transition(Transition::new("job").typed_handler(
        move |_ctx: Context, _env, job: serde_json::Value| {
            let entries = Arc::clone(&entries);
            async move {
                let id = job["id"].as_u64().unwrap_or_default();
                entries.lock().push(format!("begin {id}"));
                // Later jobs must not start while this one is suspended
                tokio::task::yield_now().await;
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                entries.lock().push(format!("end {id}"));
                Ok(())
            }
        },
    ));

    let handle = actor.start().await.unwrap();
    for id in 0..3 {
        conn.inject(json!({"to": "worker", "topic": "job", "payload": {"id": id}}).to_string());
    }
    handle.wait_for_dispatched(3).await.unwrap();

    assert_eq!(
        *log.lock(),
        vec!["begin 0", "end 0", "begin 1", "end 1", "begin 2", "end 2"]
    );
}
