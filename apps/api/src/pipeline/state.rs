//! Run state: the record threaded through every stage of one run.
//!
//! Fields are private and each has exactly one setter, called from exactly one
//! engine step; setters consume and return the state so every step hands the
//! next one a new value instead of mutating shared state.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::models::faculty::{EnrichedRecord, FacultyRecord, RecordId};
use crate::models::outreach::OutreachDraft;
use crate::models::profile::StudentProfile;
use crate::pipeline::outcome::StageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Completed,
    Degraded,
    Fatal,
    RecordFailed,
    RecordSkipped,
    ShortCircuit,
    Cancelled,
}

/// One append-only audit entry. Never read for control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: StageId,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub record_id: Option<RecordId>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    run_id: Uuid,
    input_path: String,
    parsed_profile: Option<StudentProfile>,
    target_categories: Vec<String>,
    raw_records: Vec<FacultyRecord>,
    enriched_records: Vec<EnrichedRecord>,
    generated_outputs: Vec<OutreachDraft>,
    diagnostics: Vec<Diagnostic>,
    failure_markers: BTreeSet<StageId>,
}

impl RunState {
    pub fn new(run_id: Uuid, input_path: impl Into<String>) -> Self {
        Self {
            run_id,
            input_path: input_path.into(),
            parsed_profile: None,
            target_categories: Vec::new(),
            raw_records: Vec::new(),
            enriched_records: Vec::new(),
            generated_outputs: Vec::new(),
            diagnostics: Vec::new(),
            failure_markers: BTreeSet::new(),
        }
    }

    // ── readers ──────────────────────────────────────────────────────────────

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    pub fn parsed_profile(&self) -> Option<&StudentProfile> {
        self.parsed_profile.as_ref()
    }

    pub fn target_categories(&self) -> &[String] {
        &self.target_categories
    }

    pub fn raw_records(&self) -> &[FacultyRecord] {
        &self.raw_records
    }

    pub fn enriched_records(&self) -> &[EnrichedRecord] {
        &self.enriched_records
    }

    pub fn generated_outputs(&self) -> &[OutreachDraft] {
        &self.generated_outputs
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn failure_markers(&self) -> &BTreeSet<StageId> {
        &self.failure_markers
    }

    pub fn has_failed(&self, stage: StageId) -> bool {
        self.failure_markers.contains(&stage)
    }

    // ── single-writer setters (engine only) ──────────────────────────────────

    /// Set by the parse step. A second call is ignored: the profile is
    /// read-only once set.
    pub(super) fn with_profile(mut self, profile: StudentProfile) -> Self {
        if self.parsed_profile.is_some() {
            warn!(run_id = %self.run_id, "parsed profile already set; ignoring rewrite");
            return self;
        }
        self.parsed_profile = Some(profile);
        self
    }

    /// Set by the recommend step, or by the engine from the caller's override.
    pub(super) fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.target_categories = categories;
        self
    }

    pub(super) fn with_raw_records(mut self, records: Vec<FacultyRecord>) -> Self {
        self.raw_records.extend(records);
        self
    }

    /// Enriched records must map 1:1 onto raw records by identifier; anything
    /// else is dropped.
    pub(super) fn with_enriched_records(mut self, records: Vec<EnrichedRecord>) -> Self {
        let known: BTreeSet<&RecordId> = self.raw_records.iter().map(|r| &r.id).collect();
        let (valid, orphaned): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| known.contains(r.id()));
        for orphan in orphaned {
            warn!(record_id = %orphan.id(), "dropping enriched record with unknown identifier");
        }
        self.enriched_records = valid;
        self
    }

    /// Outputs must reference enriched records; anything else is dropped.
    pub(super) fn with_outputs(mut self, outputs: Vec<OutreachDraft>) -> Self {
        let known: BTreeSet<&RecordId> = self.enriched_records.iter().map(|r| r.id()).collect();
        let (valid, orphaned): (Vec<_>, Vec<_>) = outputs
            .into_iter()
            .partition(|o| known.contains(&o.record_id));
        for orphan in orphaned {
            warn!(record_id = %orphan.record_id, "dropping output with unknown source record");
        }
        self.generated_outputs = valid;
        self
    }

    pub(super) fn record(
        mut self,
        stage: StageId,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        self.push_diagnostic(stage, kind, message.into(), None);
        self
    }

    pub(super) fn record_item(
        mut self,
        stage: StageId,
        kind: DiagnosticKind,
        record_id: &RecordId,
        message: impl Into<String>,
    ) -> Self {
        self.push_diagnostic(stage, kind, message.into(), Some(record_id.clone()));
        self
    }

    pub(super) fn mark_failed(mut self, stage: StageId) -> Self {
        self.failure_markers.insert(stage);
        self
    }

    fn push_diagnostic(
        &mut self,
        stage: StageId,
        kind: DiagnosticKind,
        message: String,
        record_id: Option<RecordId>,
    ) {
        self.diagnostics.push(Diagnostic {
            stage,
            kind,
            message,
            record_id,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::faculty::RecordId;

    fn raw(slug: &str) -> FacultyRecord {
        FacultyRecord {
            id: RecordId::from_natural_key("CS", slug),
            category: "CS".to_string(),
            name: slug.to_string(),
            designation: String::new(),
            email: None,
            phone: None,
            profile_url: format!("https://example.edu/faculty/{slug}"),
            bio: None,
            research_areas: vec![],
            personal_webpage: None,
        }
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = RunState::new(Uuid::new_v4(), "/tmp/cv.pdf");
        assert_eq!(state.input_path(), "/tmp/cv.pdf");
        assert!(state.parsed_profile().is_none());
        assert!(state.raw_records().is_empty());
        assert!(state.diagnostics().is_empty());
    }

    #[test]
    fn test_profile_cannot_be_rewritten() {
        let first = StudentProfile {
            student_name: "First".to_string(),
            ..Default::default()
        };
        let second = StudentProfile {
            student_name: "Second".to_string(),
            ..Default::default()
        };
        let state = RunState::new(Uuid::new_v4(), "cv.pdf")
            .with_profile(first)
            .with_profile(second);
        assert_eq!(state.parsed_profile().unwrap().student_name, "First");
    }

    #[test]
    fn test_enriched_records_with_unknown_ids_are_dropped() {
        let state = RunState::new(Uuid::new_v4(), "cv.pdf")
            .with_raw_records(vec![raw("a")])
            .with_enriched_records(vec![
                EnrichedRecord::unaugmented(raw("a")),
                EnrichedRecord::unaugmented(raw("ghost")),
            ]);
        assert_eq!(state.enriched_records().len(), 1);
        assert_eq!(state.enriched_records()[0].id().as_str(), "CS:a");
    }

    #[test]
    fn test_diagnostics_are_append_only_and_ordered() {
        let id = RecordId::from_natural_key("CS", "a");
        let state = RunState::new(Uuid::new_v4(), "cv.pdf")
            .record(StageId::Parse, DiagnosticKind::Completed, "parsed")
            .record_item(StageId::Enrich, DiagnosticKind::RecordFailed, &id, "boom")
            .mark_failed(StageId::Enrich);
        let kinds: Vec<_> = state.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::Completed, DiagnosticKind::RecordFailed]);
        assert_eq!(state.diagnostics()[1].record_id.as_ref(), Some(&id));
        assert!(state.has_failed(StageId::Enrich));
        assert!(!state.has_failed(StageId::Scrape));
    }
}
