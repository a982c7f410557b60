use crate::data;
use crate::types::{Recommendation, TractRecord};
use thiserror::Error;

/// Sentinel values the filter dropdowns use for "no filter".
pub const REGION_ALL: &str = "All Louisiana";
pub const PARISH_ALL: &str = "All Parishes";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("select a tract on the map or via search before saving a recommendation")]
    NoActiveTract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found,
    NotFound,
}

/// Narrow the tract table to one region. The sentinel leaves it untouched.
pub fn filter_by_region<'a>(rows: Vec<&'a TractRecord>, region: &str) -> Vec<&'a TractRecord> {
    if region == REGION_ALL {
        return rows;
    }
    rows.into_iter().filter(|r| r.region == region).collect()
}

/// Narrow by parish; applied after the region filter.
pub fn filter_by_parish<'a>(rows: Vec<&'a TractRecord>, parish: &str) -> Vec<&'a TractRecord> {
    if parish == PARISH_ALL {
        return rows;
    }
    rows.into_iter().filter(|r| r.parish == parish).collect()
}

/// Per-analyst dashboard state: the tract currently in focus plus the
/// report entries accumulated this session. Owned by exactly one session,
/// touched only by that session's sequential handlers.
#[derive(Debug, Default)]
pub struct SessionState {
    active_tract: Option<String>,
    recommendations: Vec<Recommendation>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_tract(&self) -> Option<&str> {
        self.active_tract.as_deref()
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    pub fn set_active_tract(&mut self, geoid: Option<String>) {
        self.active_tract = geoid;
    }

    pub fn reset_active_tract(&mut self) {
        self.active_tract = None;
    }

    /// Exact-match search against normalized tract ids. A hit focuses the
    /// tract; a miss leaves the session untouched and reports NotFound so
    /// the caller can tell the user instead of failing silently.
    pub fn search_by_geoid(&mut self, raw: &str, tracts: &[TractRecord]) -> SearchOutcome {
        let Some(normalized) = data::normalize_geoid(raw) else {
            return SearchOutcome::NotFound;
        };
        if tracts.iter().any(|t| t.geoid == normalized) {
            self.active_tract = Some(normalized);
            SearchOutcome::Found
        } else {
            SearchOutcome::NotFound
        }
    }

    /// Append a report entry for the active tract. Refuses, without
    /// mutating anything, when no tract is in focus.
    pub fn save_recommendation(
        &mut self,
        category: String,
        justification: String,
    ) -> Result<(), SessionError> {
        let geoid = self
            .active_tract
            .clone()
            .ok_or(SessionError::NoActiveTract)?;
        self.recommendations.push(Recommendation {
            geoid,
            category,
            justification,
        });
        Ok(())
    }

    pub fn clear_recommendations(&mut self) {
        self.recommendations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Eligibility;

    fn tract(geoid: &str, region: &str, parish: &str) -> TractRecord {
        TractRecord {
            geoid: geoid.to_string(),
            region: region.to_string(),
            parish: parish.to_string(),
            eligibility: Eligibility::Ineligible,
            poverty_rate: 0.0,
            median_income: 0.0,
            unemployment_rate: 0.0,
            population: 0,
            labor_force: 0,
            broadband_pct: 0.0,
            metro_status: String::new(),
            program_status: String::new(),
        }
    }

    fn sample_table() -> Vec<TractRecord> {
        vec![
            tract("22033070100", "Capital", "East Baton Rouge"),
            tract("22033070200", "Capital", "West Baton Rouge"),
            tract("22071001700", "Southeast", "Orleans"),
        ]
    }

    #[test]
    fn region_sentinel_returns_table_unchanged() {
        let table = sample_table();
        let rows = filter_by_region(table.iter().collect(), REGION_ALL);
        assert_eq!(rows.len(), table.len());
        let ids: Vec<&str> = rows.iter().map(|r| r.geoid.as_str()).collect();
        assert_eq!(ids, ["22033070100", "22033070200", "22071001700"]);
    }

    #[test]
    fn region_filter_is_exact_match() {
        let table = sample_table();
        let rows = filter_by_region(table.iter().collect(), "Capital");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.region == "Capital"));
    }

    #[test]
    fn parish_filter_applies_after_region() {
        let table = sample_table();
        let rows = filter_by_region(table.iter().collect(), "Capital");
        let rows = filter_by_parish(rows, "East Baton Rouge");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].geoid, "22033070100");
    }

    #[test]
    fn search_hit_sets_active_tract() {
        let table = sample_table();
        let mut session = SessionState::new();
        // Decimal-formatted input still matches after normalization.
        let outcome = session.search_by_geoid("22033070100.0", &table);
        assert_eq!(outcome, SearchOutcome::Found);
        assert_eq!(session.active_tract(), Some("22033070100"));
    }

    #[test]
    fn search_miss_leaves_state_untouched() {
        let table = sample_table();
        let mut session = SessionState::new();
        session.set_active_tract(Some("22071001700".to_string()));

        let outcome = session.search_by_geoid("99999999999", &table);
        assert_eq!(outcome, SearchOutcome::NotFound);
        assert_eq!(session.active_tract(), Some("22071001700"));

        let outcome = session.search_by_geoid("garbage", &table);
        assert_eq!(outcome, SearchOutcome::NotFound);
        assert_eq!(session.active_tract(), Some("22071001700"));
    }

    #[test]
    fn save_without_active_tract_fails_and_mutates_nothing() {
        let mut session = SessionState::new();
        let result = session.save_recommendation("Logistics".into(), "Near the port".into());
        assert_eq!(result, Err(SessionError::NoActiveTract));
        assert!(session.recommendations().is_empty());
    }

    #[test]
    fn save_with_active_tract_appends_one_entry() {
        let mut session = SessionState::new();
        session.set_active_tract(Some("22033070100".to_string()));

        session
            .save_recommendation("Logistics".into(), "Near the port".into())
            .unwrap();

        assert_eq!(session.recommendations().len(), 1);
        let entry = &session.recommendations()[0];
        assert_eq!(entry.geoid, "22033070100");
        assert_eq!(entry.category, "Logistics");
        assert_eq!(entry.justification, "Near the port");
    }

    #[test]
    fn clear_always_empties_the_report() {
        let mut session = SessionState::new();
        session.clear_recommendations();
        assert!(session.recommendations().is_empty());

        session.set_active_tract(Some("22033070100".to_string()));
        session.save_recommendation("A".into(), "x".into()).unwrap();
        session.save_recommendation("B".into(), "y".into()).unwrap();
        session.clear_recommendations();
        assert!(session.recommendations().is_empty());
    }

    #[test]
    fn reset_clears_active_tract() {
        let mut session = SessionState::new();
        session.set_active_tract(Some("22033070100".to_string()));
        session.reset_active_tract();
        assert_eq!(session.active_tract(), None);
    }
}
