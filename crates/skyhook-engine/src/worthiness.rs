//! Observation-worthiness strategies.
//!
//! Each science classification has one pure strategy over
//! `(&EventGroup, &Event, thresholds)` returning an [`Assessment`]: three
//! independent booleans (`trigger`, `pending`, `debug`) plus the reason
//! lines explaining every branch taken. The booleans are *not* mutually
//! exclusive here; the decision engine's resolution policy collapses them
//! to one state.
//!
//! Strategies are a closed set keyed by [`SourceSettings`] rather than an
//! open trait: the set of supported classifications changes with the
//! science program, not at runtime.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use skyhook_core::EventId;

use crate::error::{Error, Result};
use crate::event::{Event, EventGroup, Observatory, SourceMetrics};
use crate::proposal::{BackendKind, Proposal};

/// The outcome of one worthiness evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assessment {
    /// An observation should be dispatched.
    pub trigger: bool,
    /// A human should decide; hold the pair in `Pending`.
    pub pending: bool,
    /// Informational only; the pair is ignored but the reasons are kept.
    pub debug: bool,
    /// Timestamped reason lines appended during evaluation.
    pub log: String,
}

impl Assessment {
    /// Appends a timestamped reason line.
    pub fn note(&mut self, event_id: EventId, message: impl AsRef<str>) {
        self.log.push_str(&format!(
            "{}: Event ID {}: {}\n",
            Utc::now(),
            event_id,
            message.as_ref()
        ));
    }
}

/// A declination window an instrument can point into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecRange {
    /// Lower bound, decimal degrees.
    pub min_deg: f64,
    /// Upper bound, decimal degrees.
    pub max_deg: f64,
}

impl DecRange {
    /// Returns true if the declination falls inside the window.
    #[must_use]
    pub fn contains(&self, dec_deg: f64) -> bool {
        dec_deg > self.min_deg && dec_deg < self.max_deg
    }
}

/// Thresholds for gamma-ray burst proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GrbThresholds {
    /// Trigger on any duration, including none reported.
    pub any_duration: bool,
    /// Duration window (seconds) that triggers an observation.
    pub trigger_min_duration_secs: f64,
    /// Upper bound of the trigger window.
    pub trigger_max_duration_secs: f64,
    /// First duration window that holds for human review.
    pub pending_min_duration_1_secs: f64,
    /// Upper bound of the first pending window.
    pub pending_max_duration_1_secs: f64,
    /// Second duration window that holds for human review.
    pub pending_min_duration_2_secs: f64,
    /// Upper bound of the second pending window.
    pub pending_max_duration_2_secs: f64,
    /// Minimum Fermi detection probability (percent).
    pub fermi_min_detection_prob: f64,
    /// Minimum Swift rate significance (sigma).
    pub swift_min_rate_signif: f64,
    /// Minimum HESS significance (sigma).
    pub hess_min_significance: f64,
    /// Maximum HESS significance (sigma).
    pub hess_max_significance: f64,
    /// Reject localizations wider than this radius (degrees).
    pub max_position_uncertainty_deg: Option<f64>,
    /// First pointable declination window (compact array only).
    pub dec_window_1: Option<DecRange>,
    /// Second pointable declination window (compact array only).
    pub dec_window_2: Option<DecRange>,
}

impl Default for GrbThresholds {
    fn default() -> Self {
        Self {
            any_duration: false,
            trigger_min_duration_secs: 0.256,
            trigger_max_duration_secs: 1.023,
            pending_min_duration_1_secs: 0.124,
            pending_max_duration_1_secs: 0.255,
            pending_min_duration_2_secs: 1.024,
            pending_max_duration_2_secs: 2.048,
            fermi_min_detection_prob: 50.0,
            swift_min_rate_signif: 0.0,
            hess_min_significance: 0.0,
            hess_max_significance: 1.0,
            max_position_uncertainty_deg: None,
            dec_window_1: None,
            dec_window_2: None,
        }
    }
}

/// Thresholds for gravitational-wave proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GwThresholds {
    /// Alerts older than this are stale and only logged (seconds).
    pub max_alert_age_secs: i64,
    /// Minimum number of detecting instruments.
    pub min_instruments: usize,
    /// False-alarm-rate ceiling (Hz); events above it are likely noise and
    /// are not followed up.
    pub max_false_alarm_rate_hz: Option<f64>,
    /// Bounds on the includes-neutron-star probability.
    pub prob_ns: ProbBounds,
    /// Bounds on the binary-neutron-star probability.
    pub prob_bns: ProbBounds,
    /// Bounds on the neutron-star-black-hole probability.
    pub prob_nsbh: ProbBounds,
    /// Bounds on the binary-black-hole probability.
    pub prob_bbh: ProbBounds,
    /// Bounds on the terrestrial probability.
    pub prob_terrestrial: ProbBounds,
    /// Whether pipeline-significant events are followed up.
    pub observe_significant: bool,
}

impl Default for GwThresholds {
    fn default() -> Self {
        Self {
            max_alert_age_secs: 3 * 3600,
            min_instruments: 2,
            max_false_alarm_rate_hz: None,
            prob_ns: ProbBounds::default(),
            prob_bns: ProbBounds::default(),
            prob_nsbh: ProbBounds::default(),
            prob_bbh: ProbBounds::default(),
            prob_terrestrial: ProbBounds {
                min: 0.0,
                max: 0.95,
            },
            observe_significant: true,
        }
    }
}

/// Inclusive probability bounds for one GW class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbBounds {
    /// Minimum accepted probability.
    pub min: f64,
    /// Maximum accepted probability.
    pub max: f64,
}

impl Default for ProbBounds {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl ProbBounds {
    /// Checks a reported probability against the bounds.
    ///
    /// Returns `Some(reason)` if the value is out of bounds; a missing value
    /// passes (the pipeline did not report that class).
    fn violation(&self, label: &str, value: Option<f64>) -> Option<String> {
        let value = value?;
        if value > self.max {
            Some(format!(
                "The {label} probability ({value}) is greater than {} so not triggering.",
                self.max
            ))
        } else if value < self.min {
            Some(format!(
                "The {label} probability ({value}) is less than {} so not triggering.",
                self.min
            ))
        } else {
            None
        }
    }
}

/// Thresholds for neutrino proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NeutrinoThresholds {
    /// Maximum accepted ANTARES ranking (lower rank = higher confidence).
    pub antares_max_ranking: i32,
}

impl Default for NeutrinoThresholds {
    fn default() -> Self {
        Self {
            antares_max_ranking: 2,
        }
    }
}

/// Worthiness thresholds, one variant per supported classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceSettings {
    /// Gamma-ray burst thresholds.
    Grb(GrbThresholds),
    /// Gravitational-wave thresholds.
    Gw(GwThresholds),
    /// Neutrino thresholds.
    Neutrino(NeutrinoThresholds),
}

/// Evaluates the proposal's worthiness strategy for an event.
///
/// # Errors
///
/// Returns [`Error::Worthiness`] if the proposal's settings do not match the
/// event's classification, or if a science parameter is malformed (e.g. an
/// unparsable false-alarm rate). Such an error parks only the affected
/// (group, proposal) pair.
pub fn assess(group: &EventGroup, event: &Event, proposal: &Proposal) -> Result<Assessment> {
    match &proposal.settings {
        SourceSettings::Grb(thresholds) => assess_grb(event, proposal, thresholds),
        SourceSettings::Gw(thresholds) => assess_gw(group, event, proposal, thresholds),
        SourceSettings::Neutrino(thresholds) => assess_neutrino(event, thresholds),
    }
}

/// Decides if a GRB event is worth observing.
fn assess_grb(event: &Event, proposal: &Proposal, thresholds: &GrbThresholds) -> Result<Assessment> {
    let mut assessment = Assessment::default();
    let uncertainty = event.position.and_then(|p| p.uncertainty_deg);
    let dec = event.position.map(|p| p.dec_deg);

    if uncertainty == Some(0.0) {
        assessment.debug = true;
        assessment.note(
            event.id,
            "The event's position uncertainty is 0.0, which is likely an error, so not observing.",
        );
    } else if let (Some(max), Some(err)) = (thresholds.max_position_uncertainty_deg, uncertainty) {
        if err > max {
            assessment.debug = true;
            assessment.note(
                event.id,
                format!(
                    "The event's position uncertainty ({err:.4} deg) is greater than {max:.4} so not observing."
                ),
            );
        }
    }

    if proposal.telescope.kind == BackendKind::CompactArray {
        if let (Some(dec), Some(w1), Some(w2)) = (dec, thresholds.dec_window_1, thresholds.dec_window_2)
        {
            if !w1.contains(dec) && !w2.contains(dec) {
                assessment.debug = true;
                assessment.note(
                    event.id,
                    format!(
                        "The event's declination ({dec}) is outside window 1 ({} < dec < {}) and window 2 ({} < dec < {}).",
                        w1.min_deg, w1.max_deg, w2.min_deg, w2.max_deg
                    ),
                );
            }
        }
    }

    let (fermi_index, fermi_prob, swift_signif, hess_signif) = match &event.metrics {
        SourceMetrics::Grb {
            fermi_most_likely_index,
            fermi_detection_prob,
            swift_rate_signif,
            hess_significance,
        } => (
            *fermi_most_likely_index,
            *fermi_detection_prob,
            *swift_rate_signif,
            *hess_significance,
        ),
        _ => (None, None, None, None),
    };

    // Likelihood gate: whichever instrument reported a confidence figure
    // decides; with no figure at all the event is assumed to be a GRB.
    let mut likely = false;
    if let Some(index) = fermi_index {
        if index == 4 {
            let prob = fermi_prob.unwrap_or(0.0);
            if prob >= thresholds.fermi_min_detection_prob {
                likely = true;
                assessment.note(
                    event.id,
                    format!(
                        "Fermi GRB probability greater than {}.",
                        thresholds.fermi_min_detection_prob
                    ),
                );
            } else {
                assessment.debug = true;
                assessment.note(
                    event.id,
                    format!(
                        "Fermi GRB probability less than {} so not triggering.",
                        thresholds.fermi_min_detection_prob
                    ),
                );
            }
        } else {
            assessment.debug = true;
            assessment.note(event.id, "Fermi most-likely index is not 4 (GRB) so not triggering.");
        }
    } else if let Some(signif) = swift_signif {
        if signif >= thresholds.swift_min_rate_signif {
            likely = true;
            assessment.note(
                event.id,
                format!(
                    "Swift rate significance ({signif}) >= {:.3} sigma.",
                    thresholds.swift_min_rate_signif
                ),
            );
        } else {
            assessment.debug = true;
            assessment.note(
                event.id,
                format!(
                    "Swift rate significance ({signif}) < {:.3} sigma so not triggering.",
                    thresholds.swift_min_rate_signif
                ),
            );
        }
    } else if let Some(signif) = hess_signif {
        if signif >= thresholds.hess_min_significance && signif <= thresholds.hess_max_significance
        {
            likely = true;
            assessment.note(
                event.id,
                format!(
                    "HESS significance is {} <= ({signif:.3}) <= {}.",
                    thresholds.hess_min_significance, thresholds.hess_max_significance
                ),
            );
        } else {
            assessment.debug = true;
            assessment.note(
                event.id,
                format!(
                    "HESS significance ({signif:.3}) is outside [{}, {}] so not triggering.",
                    thresholds.hess_min_significance, thresholds.hess_max_significance
                ),
            );
        }
    } else {
        likely = true;
        assessment.note(event.id, "No probability metric given so assuming it is a GRB.");
    }

    // Duration gate.
    if thresholds.any_duration && likely {
        assessment.trigger = true;
        assessment.note(event.id, "Accepting any event duration so triggering.");
    } else if !thresholds.any_duration && event.duration_secs.is_none() {
        assessment.debug = true;
        assessment.note(event.id, "No event duration so not triggering.");
    } else if let Some(duration) = event.duration_secs {
        if likely {
            if (thresholds.trigger_min_duration_secs..=thresholds.trigger_max_duration_secs)
                .contains(&duration)
            {
                assessment.trigger = true;
                assessment.note(
                    event.id,
                    format!(
                        "Event duration between {} and {} s so triggering.",
                        thresholds.trigger_min_duration_secs, thresholds.trigger_max_duration_secs
                    ),
                );
            } else if (thresholds.pending_min_duration_1_secs
                ..=thresholds.pending_max_duration_1_secs)
                .contains(&duration)
            {
                assessment.pending = true;
                assessment.note(
                    event.id,
                    format!(
                        "Event duration between {} and {} s so waiting for a human's decision.",
                        thresholds.pending_min_duration_1_secs,
                        thresholds.pending_max_duration_1_secs
                    ),
                );
            } else if (thresholds.pending_min_duration_2_secs
                ..=thresholds.pending_max_duration_2_secs)
                .contains(&duration)
            {
                assessment.pending = true;
                assessment.note(
                    event.id,
                    format!(
                        "Event duration between {} and {} s so waiting for a human's decision.",
                        thresholds.pending_min_duration_2_secs,
                        thresholds.pending_max_duration_2_secs
                    ),
                );
            } else {
                assessment.debug = true;
                assessment.note(
                    event.id,
                    "Event duration outside of all time ranges so not triggering.",
                );
            }
        }
    }

    Ok(assessment)
}

/// Decides if a gravitational-wave event is worth observing.
fn assess_gw(
    group: &EventGroup,
    event: &Event,
    proposal: &Proposal,
    thresholds: &GwThresholds,
) -> Result<Assessment> {
    let mut assessment = Assessment::default();

    let gw = match &event.metrics {
        SourceMetrics::Gw(gw) => gw.clone(),
        _ => crate::event::GwMetrics::default(),
    };

    // A malformed FAR is a science-parameter error on this pair, not a
    // silently ignored event.
    let far_hz = match (&gw.false_alarm_rate, thresholds.max_false_alarm_rate_hz) {
        (Some(raw), Some(_)) => Some(raw.parse::<f64>().map_err(|e| {
            Error::worthiness(
                &proposal.code,
                format!("unparsable false-alarm rate '{raw}': {e}"),
            )
        })?),
        _ => None,
    };

    let stale_after = chrono::Duration::seconds(thresholds.max_alert_age_secs);
    let age = chrono::Utc::now() - group.latest_observed_at;
    let event_type = event.event_type.as_deref();

    if age > stale_after {
        assessment.debug = true;
        assessment.note(
            event.id,
            format!(
                "The event time {} is more than {} s ago so not triggering.",
                group.latest_observed_at, thresholds.max_alert_age_secs
            ),
        );
    } else if gw
        .instruments
        .as_deref()
        .is_some_and(|i| i.split(',').count() < thresholds.min_instruments)
    {
        assessment.debug = true;
        assessment.note(
            event.id,
            format!(
                "The event was seen by fewer than {} instruments ({}) so not triggering.",
                thresholds.min_instruments,
                gw.instruments.as_deref().unwrap_or("")
            ),
        );
    } else if event_type == Some("EarlyWarning") {
        assessment.trigger = true;
        assessment.note(event.id, "Early warning with no localization yet so triggering.");
    } else if event_type == Some("Retraction") {
        assessment.trigger = true;
        assessment.note(event.id, "Retraction, scheduling a no-capture observation.");
    } else if let Some(reason) = gw_rejection(&gw, far_hz, thresholds) {
        assessment.debug = true;
        assessment.note(event.id, reason);
    } else {
        assessment.trigger = true;
        assessment.note(event.id, "The probabilities look good so triggering.");
    }

    Ok(assessment)
}

/// Returns the first probability/significance objection, if any.
fn gw_rejection(
    gw: &crate::event::GwMetrics,
    far_hz: Option<f64>,
    thresholds: &GwThresholds,
) -> Option<String> {
    // A high FAR means a likely false alarm.
    if let (Some(far), Some(ceiling)) = (far_hz, thresholds.max_false_alarm_rate_hz) {
        if far > ceiling {
            return Some(format!(
                "The false-alarm rate ({far:e}) is above {ceiling:e} so not triggering."
            ));
        }
    }

    thresholds
        .prob_ns
        .violation("PROB_NS", gw.prob_ns)
        .or_else(|| thresholds.prob_bns.violation("PROB_BNS", gw.prob_bns))
        .or_else(|| thresholds.prob_nsbh.violation("PROB_NSBH", gw.prob_nsbh))
        .or_else(|| thresholds.prob_bbh.violation("PROB_BBH", gw.prob_bbh))
        .or_else(|| {
            thresholds
                .prob_terrestrial
                .violation("PROB_TERRESTRIAL", gw.prob_terrestrial)
        })
        .or_else(|| {
            (gw.significant == Some(true) && !thresholds.observe_significant).then(|| {
                "The event is pipeline-significant and this proposal only follows sub-threshold events."
                    .to_string()
            })
        })
}

/// Decides if a neutrino event is worth observing.
fn assess_neutrino(event: &Event, thresholds: &NeutrinoThresholds) -> Result<Assessment> {
    let mut assessment = Assessment::default();

    let ranking = match &event.metrics {
        SourceMetrics::Neutrino { antares_ranking } => *antares_ranking,
        _ => None,
    };

    if event.observatory == Observatory::Antares {
        match ranking {
            Some(rank) if rank <= thresholds.antares_max_ranking => {
                assessment.trigger = true;
                assessment.note(
                    event.id,
                    format!(
                        "The ANTARES ranking ({rank}) is less than or equal to {} so triggering.",
                        thresholds.antares_max_ranking
                    ),
                );
            }
            Some(rank) => {
                assessment.debug = true;
                assessment.note(
                    event.id,
                    format!(
                        "The ANTARES ranking ({rank}) is greater than {} so not triggering.",
                        thresholds.antares_max_ranking
                    ),
                );
            }
            None => {
                assessment.debug = true;
                assessment.note(event.id, "ANTARES event without a ranking so not triggering.");
            }
        }
    } else {
        assessment.trigger = true;
        assessment.note(
            event.id,
            "No thresholds for non-ANTARES observatories so triggering.",
        );
    }

    Ok(assessment)
}
