//! Timer-driven operation through `EngineService`.

mod common;

use common::*;
use ilgraph_core::{
    ConnectorPatch, CorridorStatus, EngineHandle, EngineService, Lens, TopologyError,
};
use std::time::Duration;

async fn cycles(handle: &EngineHandle) -> u64 {
    handle
        .query(|engine| engine.ooda().cycles_completed)
        .await
        .unwrap()
}

async fn advance_ms(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn first_tick_waits_one_full_period() {
    let handle = EngineService::spawn(seeded_engine());
    assert!(handle.start_loop(1_000).await.unwrap());

    advance_ms(999).await;
    assert_eq!(cycles(&handle).await, 0);

    advance_ms(1).await;
    assert_eq!(cycles(&handle).await, 1);

    for _ in 0..3 {
        advance_ms(1_000).await;
    }
    assert_eq!(cycles(&handle).await, 4);
}

#[tokio::test(start_paused = true)]
async fn starting_twice_arms_one_timer() {
    let handle = EngineService::spawn(seeded_engine());
    assert!(handle.start_loop(500).await.unwrap());
    assert!(!handle.start_loop(100).await.unwrap());
    assert_eq!(handle.loop_interval().await.unwrap(), Some(500));

    advance_ms(500).await;
    assert_eq!(cycles(&handle).await, 1);

    let started = handle
        .query(|engine| engine.bus().event_count("LOOP_STARTED"))
        .await
        .unwrap();
    assert_eq!(started, 1);
}

#[tokio::test(start_paused = true)]
async fn stopping_halts_ticks_and_keeps_state() {
    let handle = EngineService::spawn(seeded_engine());
    assert!(!handle.stop_loop().await.unwrap());

    handle.start_loop(200).await.unwrap();
    advance_ms(200).await;
    assert_eq!(cycles(&handle).await, 1);

    assert!(handle.stop_loop().await.unwrap());
    assert!(!handle.is_running().await.unwrap());
    for _ in 0..5 {
        advance_ms(200).await;
    }
    assert_eq!(cycles(&handle).await, 1);

    let stopped = handle
        .query(|engine| engine.bus().event_count("LOOP_STOPPED"))
        .await
        .unwrap();
    assert_eq!(stopped, 1);
}

#[tokio::test(start_paused = true)]
async fn zero_interval_is_rejected() {
    let handle = EngineService::spawn(seeded_engine());
    let err = handle.start_loop(0).await.unwrap_err();
    assert_eq!(err, TopologyError::InvalidInterval(0));
    assert!(!handle.is_running().await.unwrap());
}

#[tokio::test]
async fn commands_mutate_the_owned_engine() {
    let handle = EngineService::spawn(seeded_engine());
    let mut events = handle.subscribe().await.unwrap();

    handle.set_active_lens(Lens::Fog).await.unwrap();
    assert_eq!(events.recv().await.unwrap().kind(), "LENS_CHANGED");

    handle
        .update_connector("xrpl-xlm", ConnectorPatch::trust(0.1))
        .await
        .unwrap();
    let report = handle.tick().await.unwrap();
    assert_eq!(report.status_changes.len(), 1);
    assert_eq!(report.status_changes[0].new_status, CorridorStatus::Fogged);

    let route = handle.calculate_route("eth", "xlm", 10.0).await.unwrap();
    assert!(route.is_none());

    let err = handle
        .update_connector("ghost", ConnectorPatch::trust(0.5))
        .await
        .unwrap_err();
    assert_eq!(err, TopologyError::ConnectorNotFound("ghost".to_string()));

    let engine = handle.shutdown().await.unwrap();
    assert_eq!(engine.active_lens(), Lens::Fog);
    assert_eq!(engine.ooda().cycles_completed, 1);
}

#[tokio::test]
async fn handles_fail_after_shutdown() {
    let handle = EngineService::spawn(seeded_engine());
    let other = handle.clone();
    handle.shutdown().await.unwrap();

    let err = other.tick().await.unwrap_err();
    assert!(matches!(err, TopologyError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn unbounded_fees_are_rejected_and_routing_continues() {
    let handle = EngineService::spawn(seeded_engine());
    for id in ["eth-xrpl", "xrpl-xlm"] {
        let err = handle
            .update_connector(
                id,
                ConnectorPatch {
                    fee_bps: Some(u32::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidValue { field: "fee_bps", .. }));
    }

    let route = handle.calculate_route("eth", "xlm", 1.0).await.unwrap().unwrap();
    assert_eq!(route.total_fee_bps, 10 + 5);
    assert!(handle.tick().await.is_ok());
}

#[tokio::test]
async fn panicking_query_leaves_the_engine_running() {
    let handle = EngineService::spawn(seeded_engine());
    handle.tick().await.unwrap();

    let err = handle
        .query(|_| -> usize { panic!("query closure failed") })
        .await
        .unwrap_err();
    assert!(matches!(err, TopologyError::ServiceUnavailable(_)));

    let report = handle.tick().await.unwrap();
    assert_eq!(report.cycle, 2);
    assert!(handle.calculate_route("ach", "sepa", 1.0).await.unwrap().is_some());

    let engine = handle.shutdown().await.unwrap();
    assert_eq!(engine.ooda().cycles_completed, 2);
}

#[tokio::test]
async fn concurrent_clients_are_serialized() {
    let handle = EngineService::spawn(seeded_engine());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.calculate_route("ach", "sepa", 100.0).await.unwrap()
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_some());
    }

    let stored = handle.query(|engine| engine.routes().len()).await.unwrap();
    assert_eq!(stored, 8);
}
