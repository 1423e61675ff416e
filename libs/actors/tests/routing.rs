//! Router selection, routing-table consistency and group enrollment

use ditto_actors::{
    capacity_fn, register_output, unregister_output, Actor, Capacity, CapacityError, CapacityExt,
    Context, LoadAware, Output, RoundRobin, Router, RoutingLogic, Transition,
};
use network::LocalBus;
use proptest::prelude::*;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Mode {
    Ready,
}

proptest! {
    #[test]
    fn round_robin_ignores_target(
        size in 1usize..6,
        targets in prop::collection::vec("[a-z]{1,8}", 1..40),
    ) {
        let candidates: Vec<String> = (0..size).map(|i| format!("c{i}")).collect();
        let logic = RoundRobin::new();

        for (i, to) in targets.iter().enumerate() {
            let picked = logic.select(to, &candidates);
            prop_assert_eq!(picked, Some(candidates[i % size].clone()));
        }
    }

    #[test]
    fn routing_table_matches_list_model(
        ops in prop::collection::vec((any::<bool>(), 0usize..3, 0usize..4), 0..60),
    ) {
        let router = Router::new(RoundRobin::new());
        let targets = ["t0", "t1", "t2"];
        let proxies = ["p0", "p1", "p2", "p3"];
        let mut model: Vec<Vec<String>> = vec![Vec::new(); targets.len()];

        for (register, t, p) in ops {
            if register {
                router.register(targets[t], proxies[p]);
                model[t].push(proxies[p].to_string());
            } else {
                let removed = router.unregister(targets[t], proxies[p]);
                let position = model[t].iter().position(|c| c == proxies[p]);
                prop_assert_eq!(removed, position.is_some());
                if let Some(index) = position {
                    model[t].remove(index);
                }
            }
        }

        for (t, target) in targets.iter().enumerate() {
            prop_assert_eq!(router.candidates(target), model[t].clone());
        }
    }

    #[test]
    fn register_then_unregister_leaves_nothing(target in "[a-z]{1,6}", proxy in "[a-z]{1,6}") {
        let router = Router::new(RoundRobin::new());
        router.register(&target, &proxy);
        prop_assert!(router.unregister(&target, &proxy));
        prop_assert!(router.candidates(&target).is_empty());
        // Never-registered pair
        prop_assert!(!router.unregister(&target, &proxy));
    }

    #[test]
    fn payload_then_result_mapping_matches_manual(input in -1_000i64..1_000, word in "[a-z]{0,10}") {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let base = capacity_fn("square", |x: i64| async move { Ok::<_, CapacityError>(x * x) });

        let composed = capacity_fn("square", |x: i64| async move { Ok::<_, CapacityError>(x * x) })
            .map_payload(move |(n, w): (i64, String)| n + w.len() as i64)
            .map_result(|sq| format!("={sq}"));

        let (got, manual) = runtime.block_on(async {
            let got = composed.handle((input, word.clone())).await.unwrap();
            let raw = base.handle(input + word.len() as i64).await.unwrap();
            (got, format!("={raw}"))
        });
        prop_assert_eq!(got, manual);
    }
}

#[tokio::test]
async fn group_router_enrolls_workers_over_the_wire() {
    let bus = LocalBus::new();
    let router_id = "org.i2ec:scheduler";
    let pool = "org.i2ec:camera-model";

    let scheduler = Actor::group_router(router_id, Arc::new(bus.connect(router_id)), Mode::Ready, RoundRobin::new())
        .start()
        .await
        .unwrap();

    let mut workers = Vec::new();
    for name in ["model-1", "model-2"] {
        let mut worker = Actor::new(name, Arc::new(bus.connect(name)), Mode::Ready);
        worker.add_transition(Transition::new("infer"));
        worker.on_start(move |ctx: Context| async move {
            ctx.tell(register_output(router_id, pool, ctx.id())).await
        });
        workers.push(worker.start().await.unwrap());
    }

    scheduler.wait_for_dispatched(2).await.unwrap();
    let router = scheduler.context().router().cloned().unwrap();
    let mut enrolled = router.candidates(pool);
    enrolled.sort();
    assert_eq!(enrolled, vec!["model-1", "model-2"]);

    for _ in 0..4 {
        scheduler
            .context()
            .tell(Output::new(pool, "infer", json!({"img": "frame"})))
            .await
            .unwrap();
    }
    workers[0].wait_for_dispatched(2).await.unwrap();
    workers[1].wait_for_dispatched(2).await.unwrap();

    // model-1 leaves; everything goes to model-2
    workers[0]
        .context()
        .tell(unregister_output(router_id, pool, "model-1"))
        .await
        .unwrap();
    scheduler.wait_for_dispatched(3).await.unwrap();
    assert_eq!(router.candidates(pool), vec!["model-2"]);

    for _ in 0..2 {
        scheduler
            .context()
            .tell(Output::new(pool, "infer", json!({"img": "frame"})))
            .await
            .unwrap();
    }
    workers[1].wait_for_dispatched(4).await.unwrap();
    assert_eq!(workers[0].snapshot().dispatched, 2);
}

#[tokio::test]
async fn broadcast_reaches_every_registered_worker() {
    let bus = LocalBus::new();
    let router = Actor::with_router("fanout", Arc::new(bus.connect("fanout")), Mode::Ready, RoundRobin::new());
    if let Some(table) = router.router() {
        table.register("screens", "screen-a");
        table.register("screens", "screen-b");
    }
    let router = router.start().await.unwrap();

    let mut screens = Vec::new();
    for name in ["screen-a", "screen-b"] {
        let mut screen = Actor::new(name, Arc::new(bus.connect(name)), Mode::Ready);
        screen.add_transition(Transition::new("refresh"));
        screens.push(screen.start().await.unwrap());
    }

    router
        .context()
        .broadcast(Output::new("screens", "refresh", json!({})))
        .await
        .unwrap();

    for screen in &screens {
        screen.wait_for_dispatched(1).await.unwrap();
    }
}

#[tokio::test]
async fn load_aware_scheduler_follows_status_reports() {
    #[derive(Deserialize)]
    struct Status {
        name: String,
        pending: u32,
        avg_time: f64,
    }

    let bus = LocalBus::new();
    let logic = LoadAware::new();
    let costs = logic.clone();

    let mut scheduler = Actor::with_router("scheduler", Arc::new(bus.connect("scheduler")), Mode::Ready, logic);
    if let Some(table) = scheduler.router() {
        table.register("model", "m1");
        table.register("model", "m2");
    }
    scheduler.add_transition(Transition::new("status").typed_handler(
        move |_ctx: Context, _env, status: Status| {
            costs.update(status.name, f64::from(status.pending) * status.avg_time);
            async { Ok(()) }
        },
    ));
    let scheduler = scheduler.start().await.unwrap();

    let mut models = Vec::new();
    for name in ["m1", "m2"] {
        let mut model = Actor::new(name, Arc::new(bus.connect(name)), Mode::Ready);
        model.add_transition(Transition::new("infer"));
        models.push(model.start().await.unwrap());
    }

    let reporter = Actor::new("m1-reporter", Arc::new(bus.connect("m1-reporter")), Mode::Ready)
        .start()
        .await
        .unwrap();
    reporter
        .context()
        .tell(Output::new(
            "scheduler",
            "status",
            json!({"name": "m1", "pending": 3, "avg_time": 0.4}),
        ))
        .await
        .unwrap();
    scheduler.wait_for_dispatched(1).await.unwrap();

    for _ in 0..3 {
        scheduler
            .context()
            .tell(Output::new("model", "infer", json!({})))
            .await
            .unwrap();
    }
    models[1].wait_for_dispatched(3).await.unwrap();
    assert_eq!(models[0].snapshot().dispatched, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn routing_table_stays_consistent_under_concurrent_updates() {
    const WRITERS: usize = 8;
    const ROUNDS: usize = 200;

    let router = Arc::new(Router::new(RoundRobin::new()));
    router.register("pool", "stable");
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let router = Arc::clone(&router);
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut routed = 0usize;
            loop {
                let picked = router.route("pool").expect("pool always has a candidate");
                let worker = picked
                    .strip_prefix('w')
                    .and_then(|n| n.parse::<usize>().ok())
                    .is_some_and(|n| n < WRITERS);
                assert!(picked == "stable" || worker, "routed to unknown candidate {picked}");
                routed += 1;

                for task in 0..WRITERS {
                    if let Some(picked) = router.route(&format!("t{task}")) {
                        let round = picked
                            .strip_prefix(&format!("p{task}-"))
                            .and_then(|n| n.parse::<usize>().ok());
                        assert!(round.is_some_and(|r| r < ROUNDS), "routed to unknown candidate {picked}");
                    }
                }

                if done.load(Ordering::SeqCst) {
                    break;
                }
                tokio::task::yield_now().await;
            }
            routed
        })
    };

    let mut writers = Vec::new();
    for task in 0..WRITERS {
        let router = Arc::clone(&router);
        writers.push(tokio::spawn(async move {
            let proxy = format!("w{task}");
            let target = format!("t{task}");
            for round in 0..ROUNDS {
                router.register("pool", &proxy);
                router.register(&target, &format!("p{task}-{round}"));
                tokio::task::yield_now().await;
                assert!(router.unregister("pool", &proxy));
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }
    done.store(true, Ordering::SeqCst);
    assert!(reader.await.unwrap() > 0);

    assert_eq!(router.candidates("pool"), vec!["stable"]);
    for task in 0..WRITERS {
        let expected: Vec<String> = (0..ROUNDS).map(|round| format!("p{task}-{round}")).collect();
        assert_eq!(router.candidates(&format!("t{task}")), expected);
    }
    let mut targets = vec!["pool".to_string()];
    targets.extend((0..WRITERS).map(|task| format!("t{task}")));
    targets.sort();
    assert_eq!(router.targets(), targets);
}
