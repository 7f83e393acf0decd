//! Read-only queries over hospital state.
//!
//! Every query works on one snapshot, so a view never mixes revisions and
//! never holds a unit lock while it filters or aggregates.

mod aggregate;
mod alerts;

pub use aggregate::*;
pub use alerts::*;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Department, ResourceKind, ResourceSubtype, ResourceUnit};
use crate::store::{HospitalState, StateStore, StoreResult};

/// Filter and optional aggregate. Unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateQuery {
    pub kind: Option<ResourceKind>,
    pub subtype: Option<ResourceSubtype>,
    /// Only units assigned to this department; staff without an
    /// assignment never match
    pub department: Option<Department>,
    pub aggregate: Option<AggregateKind>,
}

impl StateQuery {
    pub fn full_state() -> Self {
        Self::default()
    }

    pub fn beds_only() -> Self {
        Self::of_kind(ResourceKind::Bed)
    }

    pub fn staff_only() -> Self {
        Self::of_kind(ResourceKind::Staff)
    }

    pub fn equipment_only() -> Self {
        Self::of_kind(ResourceKind::Equipment)
    }

    pub fn of_kind(kind: ResourceKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn with_subtype(mut self, subtype: ResourceSubtype) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn in_department(mut self, department: Department) -> Self {
        self.department = Some(department);
        self
    }

    pub fn with_aggregate(mut self, aggregate: AggregateKind) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn admits(&self, unit: &ResourceUnit) -> bool {
        self.kind.map_or(true, |k| unit.kind() == k)
            && self.subtype.map_or(true, |s| unit.subtype == s)
            && self.department.map_or(true, |d| unit.department == Some(d))
    }
}

/// Filtered projection of one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateView {
    pub revision: u64,
    pub taken_at: String,
    /// Matching units, by identifier
    pub units: Vec<ResourceUnit>,
    pub aggregate: Option<AggregateView>,
}

/// Answers state queries from snapshots.
pub struct QueryService<'a> {
    store: &'a StateStore,
    thresholds: AlertThresholds,
}

impl<'a> QueryService<'a> {
    pub fn new(store: &'a StateStore) -> Self {
        Self {
            store,
            thresholds: AlertThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Run a query against a fresh snapshot.
    pub fn query(&self, query: &StateQuery) -> StoreResult<StateView> {
        let state = self.store.snapshot()?;
        let view = project(&state, query, &self.thresholds);
        debug!(
            revision = view.revision,
            units = view.units.len(),
            aggregate = query.aggregate.map(|a| a.as_str()).unwrap_or("none"),
            "State query answered"
        );
        Ok(view)
    }

    /// Capacity alerts for the whole hospital.
    pub fn capacity_report(&self) -> StoreResult<CapacityReport> {
        Ok(evaluate(&self.store.snapshot()?, &self.thresholds))
    }
}

/// Apply a query to an existing snapshot.
pub fn project(state: &HospitalState, query: &StateQuery, thresholds: &AlertThresholds) -> StateView {
    let units: Vec<ResourceUnit> = state
        .units
        .iter()
        .filter(|u| query.admits(u))
        .cloned()
        .collect();

    let aggregate = query.aggregate.map(|kind| match kind {
        AggregateKind::Occupancy => AggregateView::Occupancy(occupancy(&units)),
        AggregateKind::LeastBusyStaff => AggregateView::LeastBusyStaff(least_busy_staff(&units)),
        AggregateKind::FreeEquipment => AggregateView::FreeEquipment(free_equipment(&units)),
        AggregateKind::OverloadedStaff => AggregateView::OverloadedStaff(overloaded_staff(&units)),
        AggregateKind::CapacityAlerts => AggregateView::CapacityAlerts(evaluate(state, thresholds)),
    });

    StateView {
        revision: state.revision,
        taken_at: state.taken_at.clone(),
        units,
        aggregate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatientId, ResourceUnit};

    fn store() -> StateStore {
        StateStore::new(vec![
            ResourceUnit::new("ICU-1", ResourceSubtype::IcuBed)
                .in_department(Department::Icu)
                .occupied_by(PatientId::new("P1")),
            ResourceUnit::new("TR-01", ResourceSubtype::TreatmentRoom).in_department(Department::EdTreatment),
            ResourceUnit::new("dr-jones", ResourceSubtype::EdPhysician)
                .named("Dr. Jones")
                .with_unrecorded_load(3),
            ResourceUnit::new("dr-smith", ResourceSubtype::EdPhysician)
                .named("Dr. Smith")
                .with_unrecorded_load(2),
            ResourceUnit::new("rn-lee", ResourceSubtype::EdNurse).with_unrecorded_load(4),
            ResourceUnit::new("VENT-01", ResourceSubtype::Ventilator),
        ])
        .unwrap()
    }

    #[test]
    fn test_kind_filter() {
        let store = store();
        let view = QueryService::new(&store).query(&StateQuery::beds_only()).unwrap();
        let ids: Vec<&str> = view.units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["ICU-1", "TR-01"]);
        assert!(view.aggregate.is_none());
    }

    #[test]
    fn test_department_filter() {
        let store = store();
        let view = QueryService::new(&store)
            .query(&StateQuery::full_state().in_department(Department::Icu))
            .unwrap();
        assert_eq!(view.units.len(), 1);
    }

    #[test]
    fn test_least_busy_physicians() {
        let store = store();
        let query = StateQuery::staff_only()
            .with_subtype(ResourceSubtype::EdPhysician)
            .with_aggregate(AggregateKind::LeastBusyStaff);

        let view = QueryService::new(&store).query(&query).unwrap();
        let Some(AggregateView::LeastBusyStaff(loads)) = view.aggregate else {
            panic!("expected least-busy aggregate");
        };
        let names: Vec<&str> = loads.iter().filter_map(|l| l.name.as_deref()).collect();
        assert_eq!(names, vec!["Dr. Smith", "Dr. Jones"]);
    }

    #[test]
    fn test_query_does_not_mutate() {
        let store = store();
        let service = QueryService::new(&store);
        let query = StateQuery::full_state().with_aggregate(AggregateKind::CapacityAlerts);

        let first = service.query(&query).unwrap();
        let second = service.query(&query).unwrap();
        assert_eq!(first.revision, 0);
        assert_eq!(first.units, second.units);
        assert_eq!(first.aggregate, second.aggregate);
    }

    #[test]
    fn test_query_deserializes_from_json() {
        let query: StateQuery =
            serde_json::from_str(r#"{"kind": "staff", "aggregate": "least_busy_staff"}"#).unwrap();
        assert_eq!(query, StateQuery::staff_only().with_aggregate(AggregateKind::LeastBusyStaff));
    }
}
