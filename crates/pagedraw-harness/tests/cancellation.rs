//! Session teardown: cancel, drop, late completions and start guards.

use pagedraw::{
    ControllerConfig, FilterSet, MemoryStore, ProcessState, SearchMode, SharedProcessState,
};
use pagedraw_harness::logging::init_test_tracing;
use pagedraw_harness::{SimCollection, SimHost};

fn state() -> SharedProcessState {
    ProcessState::load(Box::new(MemoryStore::new()), "filter_cache")
        .expect("state should load")
        .shared()
}

fn filtered_host() -> SimHost {
    let host = SimHost::new(SimCollection {
        declared_total: Some(37),
        ..SimCollection::with_total(37)
    });
    host.filters.set(Some(FilterSet {
        star: true,
        ..FilterSet::default()
    }));
    host
}

#[test]
fn cancel_before_begin_cancels_deferred_start() {
    init_test_tracing();
    let host = filtered_host();
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 1)
        .expect("controller");

    assert!(controller.start_smart());
    assert!(host.presenter.is_busy());
    assert_eq!(host.scheduler.pending_count(), 1);

    controller.cancel();
    assert!(!controller.is_active());
    assert!(!host.presenter.is_busy());
    assert_eq!(host.scheduler.pending_count(), 0);
    assert_eq!(host.scheduler.cancelled().len(), 1);

    controller.cancel();
    assert_eq!(host.scheduler.cancelled().len(), 1);
    assert_eq!(host.presenter.busy_shown(), 1);

    let report = host.run(&mut controller, 50);
    assert_eq!(report.completions + report.timers, 0);
    assert!(host.remote.requests().is_empty());
}

#[test]
fn late_completion_after_cancel_is_ignored() {
    init_test_tracing();
    let host = filtered_host();
    let shared = state();
    let mut controller = host
        .controller(ControllerConfig::default(), shared.clone(), 2)
        .expect("controller");

    controller.start_smart();
    assert!(host.step(&mut controller).is_some());
    let (ticket, outcome) = host.remote.pop_response().expect("page 0 in flight");

    controller.cancel();
    assert_eq!(host.remote.released(), vec![ticket]);

    controller.on_fetch_complete(ticket, outcome);
    assert!(!controller.is_active());
    assert!(host.presenter.opened().is_empty());
    assert!(host.presenter.messages().is_empty());
    assert_eq!(host.remote.requests().len(), 1);
    assert_eq!(host.scheduler.pending_count(), 0);
    let fingerprint = FilterSet {
        star: true,
        ..FilterSet::default()
    }
    .fingerprint();
    assert_eq!(shared.lock().cached_boundary(&fingerprint), None);
}

#[test]
fn stale_timer_after_cancel_is_ignored() {
    init_test_tracing();
    let host = filtered_host();
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 3)
        .expect("controller");

    controller.start_smart();
    let token = host.scheduler.pop_due().expect("begin timer");
    controller.cancel();
    controller.on_timer(token);

    assert!(!controller.is_active());
    assert!(host.remote.requests().is_empty());
}

#[test]
fn completion_from_previous_session_does_not_leak() {
    init_test_tracing();
    let host = filtered_host();
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 4)
        .expect("controller");

    controller.start_smart();
    host.step(&mut controller);
    let (old_ticket, old_outcome) = host.remote.pop_response().expect("in flight");
    controller.cancel();

    assert!(controller.start_smart());
    host.step(&mut controller);
    assert_eq!(host.remote.pending_count(), 1);

    controller.on_fetch_complete(old_ticket, old_outcome);
    assert!(controller.is_active());
    assert_eq!(host.remote.requests().len(), 2);

    host.run(&mut controller, 50);
    assert_eq!(host.presenter.opened().len(), 1);
    assert!(!host.presenter.is_busy());
}

#[test]
fn cancel_between_probes_clears_pending_timer() {
    init_test_tracing();
    let host = SimHost::new(SimCollection::with_total(4321));
    host.filters.set(Some(FilterSet {
        epic: true,
        ..FilterSet::default()
    }));
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 5)
        .expect("controller");

    controller.start_smart();
    host.step(&mut controller);
    host.step(&mut controller);
    assert_eq!(host.scheduler.pending_count(), 1, "glitch check is scheduled");

    controller.cancel();
    assert_eq!(host.scheduler.pending_count(), 0);
    assert_eq!(host.remote.pending_count(), 0);
    assert!(!host.presenter.is_busy());
}

#[test]
fn dropping_the_controller_tears_down() {
    init_test_tracing();
    let host = filtered_host();
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 6)
        .expect("controller");

    controller.start_smart();
    host.step(&mut controller);
    assert_eq!(host.remote.pending_count(), 1);

    drop(controller);
    assert_eq!(host.remote.released().len(), 1);
    assert_eq!(host.remote.pending_count(), 0);
    assert!(!host.presenter.is_busy());
}

#[test]
fn unauthenticated_start_is_a_no_op() {
    init_test_tracing();
    let host = filtered_host();
    host.auth.set(false);
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 7)
        .expect("controller");

    assert!(!controller.start_smart());
    assert!(!controller.start_chaos());
    assert!(!controller.is_active());
    assert_eq!(host.presenter.busy_shown(), 0);
    assert!(host.scheduler.delays().is_empty());

    host.auth.set(true);
    assert!(controller.start_smart());
}

#[test]
fn second_start_while_active_is_rejected() {
    init_test_tracing();
    let host = filtered_host();
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 8)
        .expect("controller");

    assert!(controller.start_smart());
    assert!(!controller.start_chaos());
    assert!(!controller.start_smart());
    assert_eq!(host.presenter.busy_shown(), 1);
    assert_eq!(controller.active_mode(), Some(SearchMode::Smart));

    host.run(&mut controller, 50);
    assert_eq!(host.presenter.opened().len(), 1);
    assert!(controller.start_smart(), "idle again after resolving");
}

#[test]
fn active_mode_reflects_chaos_fallback() {
    init_test_tracing();
    let host = SimHost::new(SimCollection {
        newest_id: Some(400),
        ..SimCollection::default()
    });
    host.filters.set(Some(FilterSet::default()));
    let mut controller = host
        .controller(ControllerConfig::default(), state(), 9)
        .expect("controller");

    controller.start_smart();
    assert_eq!(controller.active_mode(), Some(SearchMode::Smart));
    host.step(&mut controller);
    assert_eq!(controller.active_mode(), Some(SearchMode::Chaos));
    assert_eq!(controller.discovery_phase(), None);
    controller.cancel();
    assert_eq!(controller.active_mode(), None);
}
