//! End-to-end switching tests
//!
//! Drive the engine actor through its handle and raw message channel with
//! recording collaborators: takes, queueing, follow actions, early
//! triggering, safety, degradation, and restart persistence.

mod helpers;

use cuedeck_common::events::DeckEvent;
use cuedeck_common::model::{
    DoneOn, FollowAction, SourceRecord, TransitionConfig,
};
use cuedeck_engine::error::Error;
use cuedeck_engine::switcher::engine::{EngineMsg, MutationOutcome, TakeOutcome};
use cuedeck_engine::switcher::machine::Phase;
use cuedeck_engine::switcher::registry::SourceRef;
use cuedeck_engine::switcher::tracker::{Telemetry, TelemetryChannel};
use helpers::spawn_deck;

fn file(name: &str) -> SourceRecord {
    SourceRecord::file_source(name, format!("/media/{}.mov", name.to_lowercase()))
}

fn telemetry(channel: TelemetryChannel, value: f64) -> Telemetry {
    Telemetry { channel, value }
}

#[tokio::test]
async fn take_by_index_switches_and_flips_buffer() {
    let deck = spawn_deck(vec![file("A"), file("B")]).await;

    let outcome = deck.handle.take(SourceRef::Index(1), false).await.unwrap();
    assert_eq!(
        outcome,
        TakeOutcome::Switching {
            index: Some(1),
            name: "B".to_string()
        }
    );

    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Transitioning);
    assert_eq!(snapshot.active_index, Some(1));
    assert_eq!(snapshot.active_name.as_deref(), Some("B"));

    // The incoming source was loaded and started on the standby buffer
    let calls = deck.playback.calls.lock().unwrap().clone();
    assert!(calls.contains(&"load B B".to_string()));
    assert!(calls.contains(&"start B".to_string()));

    // Exactly one transition configured
    assert_eq!(deck.renderer.setups.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn take_by_name_and_inline() {
    let deck = spawn_deck(vec![file("A"), file("B")]).await;

    let outcome = deck
        .handle
        .take(SourceRef::Name("A".to_string()), false)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        TakeOutcome::Switching { index: Some(0), .. }
    ));
    deck.finish_transition();
    deck.sync().await;

    // Inline sources play with no registry index
    let ephemeral = SourceRecord::named("Ephemeral");
    let outcome = deck
        .handle
        .take(SourceRef::Inline(Box::new(ephemeral)), false)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TakeOutcome::Switching {
            index: None,
            name: "Ephemeral".to_string()
        }
    );

    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.active_index, None);
    assert_eq!(snapshot.active_name.as_deref(), Some("Ephemeral"));
}

#[tokio::test]
async fn invalid_take_is_a_logged_noop() {
    let deck = spawn_deck(vec![file("A")]).await;

    let result = deck.handle.take(SourceRef::Index(99), false).await;
    assert!(matches!(result, Err(Error::Lookup(_))));

    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.active_index, None);

    // The machine still works afterwards
    let outcome = deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    assert!(matches!(outcome, TakeOutcome::Switching { .. }));
}

#[tokio::test]
async fn pending_queue_drains_fifo_with_tail_dedup() {
    let deck = spawn_deck(vec![file("A"), file("B"), file("C")]).await;

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();

    assert_eq!(
        deck.handle.take(SourceRef::Index(1), false).await.unwrap(),
        TakeOutcome::Queued { depth: 1 }
    );
    // Consecutive duplicate of the tail is dropped
    assert_eq!(
        deck.handle.take(SourceRef::Index(1), false).await.unwrap(),
        TakeOutcome::DuplicateDropped
    );
    assert_eq!(
        deck.handle.take(SourceRef::Index(2), false).await.unwrap(),
        TakeOutcome::Queued { depth: 2 }
    );
    // Same as an earlier entry but not the tail: kept
    assert_eq!(
        deck.handle.take(SourceRef::Index(1), false).await.unwrap(),
        TakeOutcome::Queued { depth: 3 }
    );

    // Drain strictly FIFO: 1, 2, 1
    deck.finish_transition();
    deck.sync().await;
    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.active_index, Some(1));
    assert_eq!(snapshot.pending_depth, 2);

    deck.finish_transition();
    deck.sync().await;
    assert_eq!(deck.state.snapshot().await.active_index, Some(2));

    deck.finish_transition();
    deck.sync().await;
    assert_eq!(deck.state.snapshot().await.active_index, Some(1));

    deck.finish_transition();
    deck.sync().await;
    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.pending_depth, 0);
}

#[tokio::test]
async fn force_clears_queue_and_preempts() {
    let deck = spawn_deck(vec![file("A"), file("B"), file("C")]).await;

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    deck.handle.take(SourceRef::Index(1), false).await.unwrap();
    deck.handle.take(SourceRef::Index(2), false).await.unwrap();

    let outcome = deck.handle.take(SourceRef::Index(2), true).await.unwrap();
    assert!(matches!(
        outcome,
        TakeOutcome::Switching { index: Some(2), .. }
    ));
    assert_eq!(deck.state.snapshot().await.pending_depth, 0);
}

#[tokio::test]
async fn skip_to_last_and_clear_pending() {
    let deck = spawn_deck(vec![file("A"), file("B"), file("C"), file("D")]).await;

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    deck.handle.take(SourceRef::Index(1), false).await.unwrap();
    deck.handle.take(SourceRef::Index(2), false).await.unwrap();
    deck.handle.take(SourceRef::Index(3), false).await.unwrap();

    assert_eq!(deck.handle.skip_to_last_pending().await.unwrap(), 1);
    deck.finish_transition();
    deck.sync().await;
    // Jumped straight to the final destination
    assert_eq!(deck.state.snapshot().await.active_index, Some(3));

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    assert_eq!(deck.handle.clear_pending().await.unwrap(), 1);
    assert_eq!(deck.state.snapshot().await.pending_depth, 0);
}

#[tokio::test]
async fn early_trigger_fires_follow_action_once() {
    // A plays once then follows to B; B's transition takes 1.0s.
    // With 100 frames at 30 fps, the crossfade must start at frame 69
    // (30 frames remaining), not later.
    let mut a = file("A");
    a.settings.done_on = DoneOn::PlayNTimes { count: 1 };
    a.settings.follow_action = FollowAction::PlayNext;
    let mut b = file("B");
    b.settings.transition_time_secs = 1.0;

    let deck = spawn_deck(vec![a, b]).await;
    let mut events = deck.state.subscribe_events();

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    deck.finish_transition();
    deck.sync().await;

    let live = deck.live_buffer().await;
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::Length, 100.0))
        .unwrap();
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::SampleRate, 30.0))
        .unwrap();

    // One frame before the window: nothing happens
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::Index, 68.0))
        .unwrap();
    deck.sync().await;
    assert_eq!(deck.state.snapshot().await.active_index, Some(0));

    // First frame inside the window: done fires, follow action switches
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::Index, 69.0))
        .unwrap();
    deck.sync().await;
    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.active_index, Some(1));
    assert_eq!(snapshot.phase, Phase::Transitioning);

    // Further frames on the outgoing buffer must not re-fire
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::Index, 70.0))
        .unwrap();
    deck.sync().await;
    assert_eq!(deck.state.snapshot().await.pending_depth, 0);

    let mut done_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DeckEvent::SourceDone { .. }) {
            done_events += 1;
        }
    }
    assert_eq!(done_events, 1);
}

#[tokio::test]
async fn play_n_times_counts_held_edges_once() {
    // A plays twice; the loop edge held across ticks counts once, and done
    // fires on the second rising edge only.
    let mut a = file("A");
    a.settings.done_on = DoneOn::PlayNTimes { count: 2 };
    let deck = spawn_deck(vec![a, file("B")]).await;
    let mut events = deck.state.subscribe_events();

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    deck.finish_transition();
    deck.sync().await;

    let live = deck.live_buffer().await;
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::Length, 50.0))
        .unwrap();

    // First loop edge, held high for several ticks
    for _ in 0..3 {
        deck.handle
            .send_telemetry(live, telemetry(TelemetryChannel::LastFrame, 1.0))
            .unwrap();
    }
    deck.sync().await;
    let display = deck.state.display().await;
    assert_eq!(display.loop_count, Some(1));
    assert_eq!(display.loops_remaining, Some(1));

    // Falling edge then the second loop edge
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::LastFrame, 0.0))
        .unwrap();
    deck.handle
        .send_telemetry(live, telemetry(TelemetryChannel::LastFrame, 1.0))
        .unwrap();
    deck.sync().await;

    let display = deck.state.display().await;
    assert_eq!(display.loop_count, Some(2));
    assert_eq!(display.loops_remaining, Some(0));

    let mut done_events = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DeckEvent::SourceDone { .. }) {
            done_events += 1;
        }
    }
    assert_eq!(done_events, 1);
}

#[tokio::test]
async fn timer_done_fires_follow_action() {
    let mut a = file("A");
    a.settings.done_on = DoneOn::Timer { seconds: 5.0 };
    a.settings.follow_action = FollowAction::GotoName {
        name: "B".to_string(),
    };
    let deck = spawn_deck(vec![a, file("B")]).await;

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();

    // The done timer was initialized and started on the armed buffer
    let calls = deck.timers.calls.lock().unwrap().clone();
    assert!(calls.contains(&"initialize B 5.0".to_string()));
    assert!(calls.contains(&"start B".to_string()));

    deck.finish_transition();
    deck.sync().await;

    let live = deck.live_buffer().await;
    deck.sender.send(EngineMsg::TimerDone { buffer: live }).unwrap();
    deck.sync().await;

    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.active_index, Some(1));
    assert_eq!(snapshot.active_name.as_deref(), Some("B"));
}

#[tokio::test]
async fn external_done_signal() {
    let mut a = file("A");
    a.settings.done_on = DoneOn::ExternalSignal;
    a.settings.follow_action = FollowAction::GotoIndex { index: 1 };
    let deck = spawn_deck(vec![a, file("B")]).await;

    // No live source yet: nothing to complete
    assert!(!deck.handle.external_done().await.unwrap());

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    deck.finish_transition();
    deck.sync().await;

    assert!(deck.handle.external_done().await.unwrap());
    assert_eq!(deck.state.snapshot().await.active_index, Some(1));

    // The new live source has no external policy
    assert!(!deck.handle.external_done().await.unwrap());
}

#[tokio::test]
async fn transition_setup_uses_global_time_opt_in() {
    let mut a = file("A");
    a.settings.transition = TransitionConfig::Dip {
        color: [0.0, 0.0, 0.0],
    };
    a.settings.transition_time_secs = 0.5;
    let mut b = file("B");
    b.settings.use_global_transition_time = true;
    b.settings.transition_time_secs = 0.25;

    let deck = spawn_deck(vec![a, b]).await;

    deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    deck.handle.take(SourceRef::Index(1), true).await.unwrap();

    let setups = deck.renderer.setups.lock().unwrap().clone();
    assert_eq!(setups.len(), 2);
    assert!(matches!(setups[0].transition, TransitionConfig::Dip { .. }));
    assert_eq!(setups[0].duration_secs, 0.5);
    // B opts into the global transition time (2.0s in the test runtime)
    assert_eq!(setups[1].duration_secs, 2.0);
}

#[tokio::test]
async fn safety_gates_destructive_operations() {
    let deck = spawn_deck(vec![file("A"), file("B")]).await;

    assert!(deck.handle.toggle_safety().await.unwrap());

    let outcome = deck.handle.delete_source(Some(0), false).await.unwrap();
    assert_eq!(outcome, MutationOutcome::ConfirmationRequired);
    assert_eq!(deck.handle.sources().await.unwrap().len(), 2);

    let outcome = deck.handle.delete_source(Some(0), true).await.unwrap();
    assert!(matches!(outcome, MutationOutcome::Applied { .. }));
    assert_eq!(deck.handle.sources().await.unwrap().len(), 1);

    // Non-destructive reads are never gated
    assert!(!deck.handle.toggle_safety().await.unwrap());
}

#[tokio::test]
async fn delete_never_empties_registry() {
    let deck = spawn_deck(vec![file("Only")]).await;
    let result = deck.handle.delete_source(Some(0), true).await;
    assert!(matches!(result, Err(Error::Registry(_))));
    assert_eq!(deck.handle.sources().await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_before_active_shifts_index() {
    // registry = [A,B,C], Active=1 (B): Delete(0) leaves Active=0 (B)
    let deck = spawn_deck(vec![file("A"), file("B"), file("C")]).await;

    deck.handle.take(SourceRef::Index(1), false).await.unwrap();
    deck.finish_transition();
    deck.sync().await;

    deck.handle.delete_source(Some(0), true).await.unwrap();
    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.active_index, Some(0));
    assert_eq!(snapshot.active_name.as_deref(), Some("B"));
    assert_eq!(snapshot.source_names, vec!["B", "C"]);
}

#[tokio::test]
async fn file_open_failure_degrades_not_fatal() {
    let deck = spawn_deck(vec![file("Broken"), file("B")]).await;
    deck.playback.fail_load_of("Broken");
    let mut events = deck.state.subscribe_events();

    // The switch still happens; playback is degraded
    let outcome = deck.handle.take(SourceRef::Index(0), false).await.unwrap();
    assert!(matches!(outcome, TakeOutcome::Switching { .. }));
    assert_eq!(deck.state.snapshot().await.active_index, Some(0));

    deck.sync().await;
    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let DeckEvent::FileOpenFailed { name, .. } = event {
            assert_eq!(name, "Broken");
            saw_failure = true;
        }
    }
    assert!(saw_failure);

    let entries = deck.handle.log_entries().await.unwrap();
    assert!(entries.iter().any(|e| e.event == "FileOpenFailed"));
}

#[tokio::test]
async fn registry_survives_restart() {
    let deck = spawn_deck(vec![file("A"), file("B")]).await;

    deck.handle.add_source(Some(file("C")), false).await.unwrap();
    deck.handle
        .rename_source(0, "Opener".to_string(), false)
        .await
        .unwrap();
    deck.handle.take(SourceRef::Index(2), false).await.unwrap();
    deck.finish_transition();
    deck.sync().await;

    // Second engine over the same database
    let revived = helpers::spawn_deck_on(deck.pool.clone(), helpers::default_runtime()).await;
    let names: Vec<String> = revived
        .handle
        .sources()
        .await
        .unwrap()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, vec!["Opener", "C", "B"]);

    let snapshot = revived.state.snapshot().await;
    assert_eq!(snapshot.active_index, Some(2));
    assert_eq!(snapshot.selected_index, 1);
}

#[tokio::test]
async fn import_export_round_trip_via_engine() {
    let deck = spawn_deck(vec![file("A"), file("B")]).await;

    let exported = deck
        .handle
        .export(cuedeck_engine::switcher::transfer::ExportSelection::All)
        .await
        .unwrap();
    assert_eq!(exported.len(), 2);

    // Append-import the exported records back: collisions renamed
    deck.handle
        .import(
            exported,
            cuedeck_engine::switcher::transfer::ImportMode::Append,
        )
        .await
        .unwrap();

    let names: Vec<String> = deck
        .handle
        .sources()
        .await
        .unwrap()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, vec!["A", "B", "A 1", "B 1"]);
}

#[tokio::test]
async fn init_resets_everything() {
    let deck = spawn_deck(vec![file("A"), file("B")]).await;

    deck.handle.take(SourceRef::Index(1), false).await.unwrap();
    deck.handle.take(SourceRef::Index(0), false).await.unwrap();

    deck.handle.init_registry(true).await.unwrap();
    let snapshot = deck.state.snapshot().await;
    assert_eq!(snapshot.source_names, vec!["Source 0"]);
    assert_eq!(snapshot.active_index, None);
    assert_eq!(snapshot.pending_depth, 0);
    assert_eq!(snapshot.phase, Phase::Idle);

    // Only the Init entry remains in the log
    let entries = deck.handle.log_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, "Init");
}
