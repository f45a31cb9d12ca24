//! End-to-end engine scenarios: ingest an alert, evaluate proposals,
//! resolve decisions, dispatch observations.

use std::sync::Arc;

use chrono::Utc;

use skyhook_core::{ProposalId, SkyPosition};
use skyhook_engine::config::EngineConfig;
use skyhook_engine::decision::DecisionState;
use skyhook_engine::dispatch::memory::{InMemoryBackend, ScriptedResponse};
use skyhook_engine::dispatch::Dispatcher;
use skyhook_engine::engine::DecisionEngine;
use skyhook_engine::error::{Error, Result};
use skyhook_engine::event::{
    AlertRole, Classification, Event, GwMetrics, Observatory, SourceMetrics,
};
use skyhook_engine::metrics::EngineMetrics;
use skyhook_engine::notify::{NoopNotifier, RecordingNotifier};
use skyhook_engine::proposal::{
    BackendKind, Proposal, ProposalRegistry, TelescopeBinding, TriggerMode,
};
use skyhook_engine::store::{DecisionStore, ObservationStore};
use skyhook_engine::worthiness::{GrbThresholds, GwThresholds, SourceSettings};

fn binding(telescope: &str) -> TelescopeBinding {
    TelescopeBinding {
        telescope: telescope.to_string(),
        kind: BackendKind::MultiBeam,
        project_id: "G0001".into(),
        default_duration_secs: 900.0,
        repoint_allowed: false,
        repoint_threshold_deg: 4.0,
        default_pointings: Vec::new(),
    }
}

fn grb_proposal(id: u32, priority: i32) -> Proposal {
    Proposal {
        id: ProposalId::new(id),
        code: format!("GRB_PROP_{id}"),
        description: "short GRB follow-up".into(),
        classification: Classification::Grb,
        telescope: binding("mwa"),
        trigger_mode: TriggerMode::Both,
        priority,
        active: true,
        version: "1.0.0".into(),
        settings: SourceSettings::Grb(GrbThresholds::default()),
    }
}

fn gw_proposal(id: u32, priority: i32, thresholds: GwThresholds) -> Proposal {
    Proposal {
        id: ProposalId::new(id),
        code: format!("GW_PROP_{id}"),
        description: "GW follow-up".into(),
        classification: Classification::Gw,
        telescope: binding("mwa"),
        trigger_mode: TriggerMode::Both,
        priority,
        active: true,
        version: "1.0.0".into(),
        settings: SourceSettings::Gw(thresholds),
    }
}

struct Harness {
    engine: DecisionEngine,
    backend: Arc<InMemoryBackend>,
    notifier: Arc<RecordingNotifier>,
    observations: Arc<ObservationStore>,
}

fn harness(proposals: Vec<Proposal>) -> Harness {
    let backend = Arc::new(InMemoryBackend::new("mwa", BackendKind::MultiBeam));
    let notifier = Arc::new(RecordingNotifier::new());
    let observations = Arc::new(ObservationStore::new());
    let dispatcher = Dispatcher::new(
        vec![backend.clone()],
        observations.clone(),
        EngineConfig::default(),
        EngineMetrics::new(),
    );
    let engine = DecisionEngine::new(
        ProposalRegistry::load(proposals).expect("registry"),
        Arc::new(DecisionStore::new()),
        dispatcher,
        notifier.clone(),
    );
    Harness {
        engine,
        backend,
        notifier,
        observations,
    }
}

fn short_grb(trig_id: &str) -> Event {
    Event::new(
        trig_id,
        Observatory::Swift,
        Classification::Grb,
        AlertRole::Observation,
        Utc::now(),
    )
    .with_position(SkyPosition::new(120.0, -25.0, Some(1.0)))
    .with_duration(0.5)
    .with_metrics(SourceMetrics::Grb {
        fermi_most_likely_index: None,
        fermi_detection_prob: None,
        swift_rate_signif: Some(5.0),
        hess_significance: None,
    })
}

fn gw_alert(trig_id: &str, metrics: GwMetrics) -> Event {
    Event::new(
        trig_id,
        Observatory::Lvc,
        Classification::Gw,
        AlertRole::Observation,
        Utc::now(),
    )
    .with_metrics(SourceMetrics::Gw(metrics))
}

#[tokio::test]
async fn worthy_grb_triggers_exactly_once() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    let outcomes = h.engine.ingest(short_grb("GRB240101A")).await?;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].state, DecisionState::Triggered);
    let dispatch = outcomes[0].dispatch.as_ref().expect("dispatch outcome");
    assert!(!dispatch.reused_existing);
    assert_eq!(h.backend.submission_count(), 1);

    // A re-delivered alert for the same trigger id never re-dispatches.
    let outcomes = h.engine.ingest(short_grb("GRB240101A")).await?;
    assert!(outcomes.is_empty());
    assert_eq!(h.backend.submission_count(), 1);

    let decision = h
        .engine
        .decisions()
        .for_pair("GRB240101A", ProposalId::new(1))?
        .expect("decision");
    assert_eq!(decision.state, DecisionState::Triggered);
    assert_eq!(h.observations.for_decision(decision.id)?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn proposals_evaluate_in_priority_then_id_order() -> Result<()> {
    let h = harness(vec![
        grb_proposal(5, 2),
        grb_proposal(3, 1),
        grb_proposal(4, 1),
    ]);

    let outcomes = h.engine.ingest(short_grb("GRB240102B")).await?;
    let order: Vec<u32> = outcomes.iter().map(|o| o.proposal_id.value()).collect();
    assert_eq!(order, vec![3, 4, 5]);

    // Notifications fan out in the same order.
    let notices = h.notifier.notices();
    let notified: Vec<u32> = notices.iter().map(|n| n.proposal_id.value()).collect();
    assert_eq!(notified, vec![3, 4, 5]);
    Ok(())
}

#[tokio::test]
async fn pending_duration_holds_for_a_human() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    let event = short_grb("GRB240103C").with_duration(1.5);
    let outcomes = h.engine.ingest(event).await?;
    assert_eq!(outcomes[0].state, DecisionState::Pending);
    assert_eq!(h.backend.submission_count(), 0);

    let decision = h
        .engine
        .decisions()
        .for_pair("GRB240103C", ProposalId::new(1))?
        .expect("decision");
    assert!(decision.reason_log.contains("waiting for a human's decision"));
    Ok(())
}

#[tokio::test]
async fn unworthy_event_is_ignored_with_reasons_kept() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    let mut event = short_grb("GRB240104D");
    event.duration_secs = None;
    let outcomes = h.engine.ingest(event).await?;
    assert_eq!(outcomes[0].state, DecisionState::Ignored);
    assert_eq!(h.backend.submission_count(), 0);

    let decision = h
        .engine
        .decisions()
        .for_pair("GRB240104D", ProposalId::new(1))?
        .expect("decision");
    assert!(decision.reason_log.contains("No event duration"));
    Ok(())
}

#[tokio::test]
async fn strategy_error_parks_one_pair_and_spares_siblings() -> Result<()> {
    let strict = GwThresholds {
        max_false_alarm_rate_hz: Some(1e-8),
        ..GwThresholds::default()
    };
    let h = harness(vec![
        gw_proposal(1, 1, strict),
        gw_proposal(2, 2, GwThresholds::default()),
    ]);

    let event = gw_alert(
        "S240105a",
        GwMetrics {
            false_alarm_rate: Some("garbage".into()),
            instruments: Some("H1,L1".into()),
            ..GwMetrics::default()
        },
    );
    let outcomes = h.engine.ingest(event).await?;
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].state, DecisionState::Error);
    assert_eq!(outcomes[1].state, DecisionState::Triggered);
    assert_eq!(h.backend.submission_count(), 1);

    // The errored pair stays parked on later alerts until an operator
    // clears it.
    let event = gw_alert(
        "S240105a",
        GwMetrics {
            false_alarm_rate: Some("1e-7".into()),
            instruments: Some("H1,L1".into()),
            ..GwMetrics::default()
        },
    );
    let outcomes = h.engine.ingest(event).await?;
    assert!(outcomes.iter().all(|o| o.proposal_id != ProposalId::new(1)));

    let cleared = h
        .engine
        .clear_error("S240105a", ProposalId::new(1), "operator@obs")
        .await?;
    assert_eq!(cleared.state, DecisionState::Pending);
    assert!(cleared.reason_log.contains("error cleared by operator@obs"));
    Ok(())
}

#[tokio::test]
async fn cancelled_pair_stays_closed() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    let event = short_grb("GRB240106E").with_duration(1.5);
    h.engine.ingest(event).await?;

    let cancelled = h
        .engine
        .cancel("GRB240106E", ProposalId::new(1), "operator@obs")
        .await?;
    assert_eq!(cancelled.state, DecisionState::Cancelled);

    // A worthy follow-up alert cannot reopen it.
    let outcomes = h.engine.ingest(short_grb("GRB240106E")).await?;
    assert!(outcomes.is_empty());
    assert_eq!(h.backend.submission_count(), 0);

    let err = h
        .engine
        .cancel("GRB240106E", ProposalId::new(1), "operator@obs")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));
    Ok(())
}

#[tokio::test]
async fn ignored_group_short_circuits_processing() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    let pending = short_grb("GRB240107F").with_duration(1.5);
    h.engine.ingest(pending).await?;
    h.engine.grouper().set_group_ignored("GRB240107F", true)?;

    let outcomes = h.engine.ingest(short_grb("GRB240107F")).await?;
    assert!(outcomes.is_empty());
    assert_eq!(h.backend.submission_count(), 0);
    Ok(())
}

#[tokio::test]
async fn classification_conflict_drops_the_event_only() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    h.engine.ingest(short_grb("T9000").with_duration(1.5)).await?;

    let conflicting = gw_alert("T9000", GwMetrics::default());
    let outcomes = h.engine.ingest(conflicting).await?;
    assert!(outcomes.is_empty());

    let group = h.engine.grouper().group("T9000")?.expect("group");
    assert_eq!(group.classification, Classification::Grb);
    assert!(!group.ignored);
    Ok(())
}

#[tokio::test]
async fn unmatched_classification_creates_no_decision() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    let neutrino = Event::new(
        "NU-ONLY",
        Observatory::IceCube,
        Classification::Neutrino,
        AlertRole::Observation,
        Utc::now(),
    );
    let outcomes = h.engine.ingest(neutrino).await?;
    assert!(outcomes.is_empty());

    // The group exists for audit, but no (group, proposal) pair does.
    assert!(h.engine.grouper().group("NU-ONLY")?.is_some());
    assert!(h.engine.decisions().is_empty()?);
    assert_eq!(h.backend.submission_count(), 0);
    assert!(h.notifier.notices().is_empty());
    Ok(())
}

#[tokio::test]
async fn notification_failure_never_blocks_the_decision() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);
    h.notifier.set_failing(true);

    let outcomes = h.engine.ingest(short_grb("GRB240108G")).await?;
    assert_eq!(outcomes[0].state, DecisionState::Triggered);
    assert!(h.notifier.notices().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_alerts_dispatch_in_pretend_mode() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    let mut event = short_grb("GRB240109H");
    event.role = AlertRole::Test;
    let outcomes = h.engine.ingest(event).await?;
    assert_eq!(outcomes[0].state, DecisionState::Triggered);

    let requests = h.backend.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].pretend);
    Ok(())
}

#[tokio::test]
async fn real_only_proposal_skips_test_alerts() -> Result<()> {
    let mut proposal = grb_proposal(1, 1);
    proposal.trigger_mode = TriggerMode::Real;
    let h = harness(vec![proposal]);

    let mut event = short_grb("GRB240110I");
    event.role = AlertRole::Test;
    let outcomes = h.engine.ingest(event).await?;
    assert!(outcomes.is_empty());
    assert_eq!(h.backend.submission_count(), 0);
    Ok(())
}

#[tokio::test]
async fn registry_reload_applies_to_subsequent_units() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);

    h.engine.reload_registry(vec![grb_proposal(2, 1)])?;

    let outcomes = h.engine.ingest(short_grb("GRB240111J")).await?;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].proposal_id, ProposalId::new(2));

    // The replaced proposal is deactivated, not deleted.
    let registry = h.engine.registry()?;
    let old = registry.get(ProposalId::new(1)).expect("carried forward");
    assert!(!old.active);
    Ok(())
}

#[test]
fn empty_registry_is_a_startup_error() {
    let err = ProposalRegistry::load(Vec::new()).unwrap_err();
    assert!(matches!(err, Error::RegistryLoad { .. }));
}

#[tokio::test]
async fn empty_trigger_id_is_rejected() {
    let backend = Arc::new(InMemoryBackend::new("mwa", BackendKind::MultiBeam));
    let dispatcher = Dispatcher::new(
        vec![backend],
        Arc::new(ObservationStore::new()),
        EngineConfig::default(),
        EngineMetrics::new(),
    );
    let engine = DecisionEngine::new(
        ProposalRegistry::load(vec![grb_proposal(1, 1)]).expect("registry"),
        Arc::new(DecisionStore::new()),
        dispatcher,
        Arc::new(NoopNotifier),
    );

    let err = engine.ingest(short_grb("")).await.unwrap_err();
    assert!(matches!(err, Error::EmptyTriggerId));
}

#[tokio::test]
async fn rejected_backend_parks_the_pair() -> Result<()> {
    let h = harness(vec![grb_proposal(1, 1)]);
    h.backend
        .push_response(ScriptedResponse::Reject("array in maintenance".into()));

    let outcomes = h.engine.ingest(short_grb("GRB240112K")).await?;
    assert_eq!(outcomes[0].state, DecisionState::Error);
    assert_eq!(h.backend.submission_count(), 1);

    let decision = h
        .engine
        .decisions()
        .for_pair("GRB240112K", ProposalId::new(1))?
        .expect("decision");
    assert!(decision.reason_log.contains("array in maintenance"));
    Ok(())
}
