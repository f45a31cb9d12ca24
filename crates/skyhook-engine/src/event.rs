//! Normalized alert events and their deduplication groups.
//!
//! An [`Event`] is one normalized alert as delivered by the upstream
//! normalizer (VOEvent or Kafka GCN notice, already parsed). Events are
//! immutable once created, with two exceptions: the `ignored` flag and
//! position refinement handled by the grouper.
//!
//! An [`EventGroup`] is the unit of deduplication: exactly one group exists
//! per distinct trigger id, and its position fields always reflect the most
//! precise localization seen so far for that trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skyhook_core::{EventId, SkyPosition};

/// Source classification of a transient alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Gamma-ray burst.
    Grb,
    /// Gravitational wave.
    Gw,
    /// Neutrino.
    Neutrino,
    /// Anything else (flare stars, unclassified transients).
    Flare,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grb => write!(f, "GRB"),
            Self::Gw => write!(f, "GW"),
            Self::Neutrino => write!(f, "NU"),
            Self::Flare => write!(f, "FS"),
        }
    }
}

/// Whether the alert is a live observation or a broker test injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertRole {
    /// A real astrophysical alert.
    Observation,
    /// A test alert injected by the broker or an operator.
    Test,
}

impl std::fmt::Display for AlertRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Observation => write!(f, "observation"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// The instrument that originated an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Observatory {
    /// Fermi GBM/LAT.
    Fermi,
    /// Swift BAT/XRT.
    Swift,
    /// HESS atmospheric Cherenkov array.
    Hess,
    /// LIGO/Virgo/KAGRA collaboration.
    Lvc,
    /// ANTARES neutrino telescope.
    Antares,
    /// IceCube neutrino observatory.
    IceCube,
}

impl std::fmt::Display for Observatory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fermi => write!(f, "Fermi"),
            Self::Swift => write!(f, "SWIFT"),
            Self::Hess => write!(f, "HESS"),
            Self::Lvc => write!(f, "LVC"),
            Self::Antares => write!(f, "Antares"),
            Self::IceCube => write!(f, "IceCube"),
        }
    }
}

/// Gravitational-wave classification probabilities and bookkeeping.
///
/// The false-alarm rate arrives as the raw broker string; it is parsed at
/// evaluation time so a malformed value surfaces as a decision error on the
/// affected pair instead of poisoning ingestion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GwMetrics {
    /// False-alarm rate in Hz, as reported (e.g. `"3.2e-10"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub false_alarm_rate: Option<String>,
    /// Whether the pipeline flagged the event significant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significant: Option<bool>,
    /// Comma-separated detector list (e.g. `"H1,L1"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruments: Option<String>,
    /// Probability the event includes a neutron star.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_ns: Option<f64>,
    /// Binary neutron star probability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_bns: Option<f64>,
    /// Neutron star-black hole probability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_nsbh: Option<f64>,
    /// Binary black hole probability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_bbh: Option<f64>,
    /// Terrestrial (noise) probability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prob_terrestrial: Option<f64>,
    /// URL of the localization skymap, when published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skymap_url: Option<String>,
}

/// Classification-specific probability and ranking fields.
///
/// Modeled as a closed tagged variant rather than a bag of nullable columns:
/// each classification carries exactly the figures its worthiness strategy
/// reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceMetrics {
    /// Gamma-ray burst figures.
    #[serde(rename_all = "camelCase")]
    Grb {
        /// Fermi's most-likely source class index (4 = GRB).
        #[serde(skip_serializing_if = "Option::is_none")]
        fermi_most_likely_index: Option<i32>,
        /// Fermi GRB detection probability, percent.
        #[serde(skip_serializing_if = "Option::is_none")]
        fermi_detection_prob: Option<f64>,
        /// Swift rate significance, sigma.
        #[serde(skip_serializing_if = "Option::is_none")]
        swift_rate_signif: Option<f64>,
        /// HESS significance, sigma.
        #[serde(skip_serializing_if = "Option::is_none")]
        hess_significance: Option<f64>,
    },
    /// Gravitational-wave figures.
    Gw(GwMetrics),
    /// Neutrino figures.
    #[serde(rename_all = "camelCase")]
    Neutrino {
        /// ANTARES alert ranking (lower is more confident).
        #[serde(skip_serializing_if = "Option::is_none")]
        antares_ranking: Option<i32>,
    },
    /// No classification-specific figures.
    None,
}

impl Default for SourceMetrics {
    fn default() -> Self {
        Self::None
    }
}

/// One normalized transient alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Skyhook-assigned unique identifier.
    pub id: EventId,
    /// Externally assigned trigger id; may collide across unrelated sources.
    pub trig_id: String,
    /// Sequence number within the trigger, as assigned upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_num: Option<u32>,
    /// Originating instrument.
    pub observatory: Observatory,
    /// Notice type within the stream (e.g. `"EarlyWarning"`, `"Retraction"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Live alert or broker test injection.
    pub role: AlertRole,
    /// When the instrument observed the event (UTC).
    pub observed_at: DateTime<Utc>,
    /// When Skyhook received the alert (UTC).
    pub received_at: DateTime<Utc>,
    /// Sky localization, when the alert carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SkyPosition>,
    /// Event duration in seconds, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Source classification.
    pub classification: Classification,
    /// Classification-specific figures.
    #[serde(default)]
    pub metrics: SourceMetrics,
    /// Reference to the raw payload (storage key or URL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload_ref: Option<String>,
    /// Set when the event was dropped from processing (e.g. classification
    /// conflict with its group).
    #[serde(default)]
    pub ignored: bool,
}

impl Event {
    /// Creates a new event with the required fields; optional fields start
    /// empty and are filled with the `with_*` builders.
    #[must_use]
    pub fn new(
        trig_id: impl Into<String>,
        observatory: Observatory,
        classification: Classification,
        role: AlertRole,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::generate(),
            trig_id: trig_id.into(),
            sequence_num: None,
            observatory,
            event_type: None,
            role,
            observed_at,
            received_at: Utc::now(),
            position: None,
            duration_secs: None,
            classification,
            metrics: SourceMetrics::None,
            raw_payload_ref: None,
            ignored: false,
        }
    }

    /// Sets the sky localization.
    #[must_use]
    pub const fn with_position(mut self, position: SkyPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Sets the event duration in seconds.
    #[must_use]
    pub const fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    /// Sets the classification-specific figures.
    #[must_use]
    pub fn with_metrics(mut self, metrics: SourceMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the upstream sequence number.
    #[must_use]
    pub const fn with_sequence(mut self, sequence_num: u32) -> Self {
        self.sequence_num = Some(sequence_num);
        self
    }

    /// Sets the notice type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the raw payload reference.
    #[must_use]
    pub fn with_raw_payload_ref(mut self, reference: impl Into<String>) -> Self {
        self.raw_payload_ref = Some(reference.into());
        self
    }
}

/// The deduplication unit grouping all events that share a trigger id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventGroup {
    /// The grouping key.
    pub trig_id: String,
    /// Earliest observation time across member events.
    pub earliest_observed_at: DateTime<Utc>,
    /// Latest observation time across member events.
    pub latest_observed_at: DateTime<Utc>,
    /// Best-known localization; only ever replaced by a strictly more
    /// precise one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<SkyPosition>,
    /// Source classification fixed by the first member event.
    pub classification: Classification,
    /// Set when operators drop the whole group from processing.
    #[serde(default)]
    pub ignored: bool,
    /// Member event ids in arrival order.
    pub event_ids: Vec<EventId>,
    /// When the group was created (UTC).
    pub created_at: DateTime<Utc>,
}

impl EventGroup {
    /// Seeds a new group from its first event.
    #[must_use]
    pub fn seeded_from(event: &Event) -> Self {
        Self {
            trig_id: event.trig_id.clone(),
            earliest_observed_at: event.observed_at,
            latest_observed_at: event.observed_at,
            position: event.position,
            classification: event.classification,
            ignored: false,
            event_ids: vec![event.id],
            created_at: Utc::now(),
        }
    }

    /// Merges a subsequent event for the same trigger id into the group.
    ///
    /// Extends the observed time window and adopts the event's position only
    /// when it localizes strictly better than the stored one.
    pub fn merge(&mut self, event: &Event) {
        if event.observed_at < self.earliest_observed_at {
            self.earliest_observed_at = event.observed_at;
        }
        if event.observed_at > self.latest_observed_at {
            self.latest_observed_at = event.observed_at;
        }

        if let Some(incoming) = event.position {
            let adopt = match self.position {
                Some(stored) => incoming.is_more_precise_than(&stored),
                None => incoming.effective_uncertainty().is_some(),
            };
            if adopt {
                self.position = Some(incoming);
            }
        }

        self.event_ids.push(event.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grb_event(trig_id: &str, uncertainty: Option<f64>) -> Event {
        let mut event = Event::new(
            trig_id,
            Observatory::Swift,
            Classification::Grb,
            AlertRole::Observation,
            Utc::now(),
        );
        event.position = Some(SkyPosition::new(120.0, -30.0, uncertainty));
        event
    }

    #[test]
    fn group_seeds_from_first_event() {
        let event = grb_event("T100", Some(2.0));
        let group = EventGroup::seeded_from(&event);
        assert_eq!(group.trig_id, "T100");
        assert_eq!(group.classification, Classification::Grb);
        assert_eq!(group.event_ids, vec![event.id]);
        assert_eq!(group.position, event.position);
    }

    #[test]
    fn merge_adopts_only_more_precise_positions() {
        let first = grb_event("T100", Some(2.0));
        let mut group = EventGroup::seeded_from(&first);

        let refined = grb_event("T100", Some(0.5));
        group.merge(&refined);
        assert_eq!(group.position, refined.position);

        // A wider localization never regresses the stored one.
        let wider = grb_event("T100", Some(5.0));
        group.merge(&wider);
        assert_eq!(group.position, refined.position);
    }

    #[test]
    fn merge_extends_the_observed_window() {
        let first = grb_event("T100", None);
        let mut group = EventGroup::seeded_from(&first);

        let mut earlier = grb_event("T100", None);
        earlier.observed_at = first.observed_at - chrono::Duration::minutes(5);
        let mut later = grb_event("T100", None);
        later.observed_at = first.observed_at + chrono::Duration::minutes(5);

        group.merge(&earlier);
        group.merge(&later);

        assert_eq!(group.earliest_observed_at, earlier.observed_at);
        assert_eq!(group.latest_observed_at, later.observed_at);
        assert_eq!(group.event_ids.len(), 3);
    }

    #[test]
    fn zero_uncertainty_position_does_not_replace_nothing() {
        let mut unlocalized = grb_event("T100", None);
        unlocalized.position = None;
        let mut group = EventGroup::seeded_from(&unlocalized);

        let bogus = grb_event("T100", Some(0.0));
        group.merge(&bogus);
        assert_eq!(group.position, None);
    }

    #[test]
    fn source_metrics_serialize_tagged() {
        let metrics = SourceMetrics::Neutrino {
            antares_ranking: Some(1),
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["kind"], "neutrino");
        assert_eq!(json["antaresRanking"], 1);
    }
}
