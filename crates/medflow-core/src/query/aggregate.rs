//! Aggregate projections over snapshot units.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::{
    ParseSubtypeError, ResourceKind, ResourceSubtype, ResourceUnit, UnitId, UnitStatus,
};

use super::alerts::CapacityReport;

/// Which aggregate a query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    /// Occupancy percentage per subtype
    Occupancy,
    /// Staff ascending by workload, then identifier
    LeastBusyStaff,
    /// Free equipment counts per subtype
    FreeEquipment,
    /// Staff at or over capacity
    OverloadedStaff,
    /// Hospital-wide capacity alerts
    CapacityAlerts,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 5] = [
        AggregateKind::Occupancy,
        AggregateKind::LeastBusyStaff,
        AggregateKind::FreeEquipment,
        AggregateKind::OverloadedStaff,
        AggregateKind::CapacityAlerts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Occupancy => "occupancy",
            AggregateKind::LeastBusyStaff => "least_busy_staff",
            AggregateKind::FreeEquipment => "free_equipment",
            AggregateKind::OverloadedStaff => "overloaded_staff",
            AggregateKind::CapacityAlerts => "capacity_alerts",
        }
    }
}

impl FromStr for AggregateKind {
    type Err = ParseSubtypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        AggregateKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| ParseSubtypeError {
                input: s.to_string(),
                suggestion: None,
            })
    }
}

/// Occupancy of one subtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyRow {
    pub subtype: ResourceSubtype,
    pub units: u32,
    pub free: u32,
    pub reserved: u32,
    pub occupied: u32,
    /// Claims held over claims possible. Equals unit occupancy for beds and
    /// equipment; summed workload over summed capacity for staff.
    pub occupancy_percent: f64,
}

/// One staff member's load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffLoad {
    pub unit_id: UnitId,
    pub name: Option<String>,
    pub subtype: ResourceSubtype,
    pub workload: u32,
    pub capacity: u32,
}

impl StaffLoad {
    fn of(unit: &ResourceUnit) -> Self {
        Self {
            unit_id: unit.id.clone(),
            name: unit.name.clone(),
            subtype: unit.subtype,
            workload: unit.workload(),
            capacity: unit.capacity,
        }
    }
}

/// Free equipment of one subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentCount {
    pub subtype: ResourceSubtype,
    pub free: u32,
    pub total: u32,
}

/// Computed aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "rows", rename_all = "snake_case")]
pub enum AggregateView {
    Occupancy(Vec<OccupancyRow>),
    LeastBusyStaff(Vec<StaffLoad>),
    FreeEquipment(Vec<EquipmentCount>),
    OverloadedStaff(Vec<StaffLoad>),
    CapacityAlerts(CapacityReport),
}

pub fn occupancy<'a>(units: impl IntoIterator<Item = &'a ResourceUnit>) -> Vec<OccupancyRow> {
    #[derive(Default)]
    struct Tally {
        units: u32,
        free: u32,
        reserved: u32,
        occupied: u32,
        held: u32,
        capacity: u32,
    }

    let mut tallies: BTreeMap<ResourceSubtype, Tally> = BTreeMap::new();
    for unit in units {
        let tally = tallies.entry(unit.subtype).or_default();
        tally.units += 1;
        match unit.status() {
            UnitStatus::Free => tally.free += 1,
            UnitStatus::Reserved => tally.reserved += 1,
            UnitStatus::Occupied => tally.occupied += 1,
        }
        tally.held += unit.workload().min(unit.capacity);
        tally.capacity += unit.capacity;
    }

    tallies
        .into_iter()
        .map(|(subtype, t)| OccupancyRow {
            subtype,
            units: t.units,
            free: t.free,
            reserved: t.reserved,
            occupied: t.occupied,
            occupancy_percent: if t.capacity == 0 {
                0.0
            } else {
                t.held as f64 / t.capacity as f64 * 100.0
            },
        })
        .collect()
}

/// Staff ascending by workload; ties by identifier.
pub fn least_busy_staff<'a>(units: impl IntoIterator<Item = &'a ResourceUnit>) -> Vec<StaffLoad> {
    let mut loads: Vec<StaffLoad> = units
        .into_iter()
        .filter(|u| !u.is_exclusive())
        .map(StaffLoad::of)
        .collect();
    loads.sort_by(|a, b| a.workload.cmp(&b.workload).then_with(|| a.unit_id.cmp(&b.unit_id)));
    loads
}

/// Staff with no spare capacity, most loaded first.
pub fn overloaded_staff<'a>(units: impl IntoIterator<Item = &'a ResourceUnit>) -> Vec<StaffLoad> {
    let mut loads: Vec<StaffLoad> = units
        .into_iter()
        .filter(|u| !u.is_exclusive() && u.spare_capacity() == 0)
        .map(StaffLoad::of)
        .collect();
    loads.sort_by(|a, b| b.workload.cmp(&a.workload).then_with(|| a.unit_id.cmp(&b.unit_id)));
    loads
}

pub fn free_equipment<'a>(units: impl IntoIterator<Item = &'a ResourceUnit>) -> Vec<EquipmentCount> {
    let mut counts: BTreeMap<ResourceSubtype, EquipmentCount> = BTreeMap::new();
    for unit in units.into_iter().filter(|u| u.kind() == ResourceKind::Equipment) {
        let count = counts.entry(unit.subtype).or_insert(EquipmentCount {
            subtype: unit.subtype,
            free: 0,
            total: 0,
        });
        count.total += 1;
        if unit.is_free() {
            count.free += 1;
        }
    }
    counts.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientId;

    #[test]
    fn test_least_busy_order() {
        let units = vec![
            ResourceUnit::new("dr-c", ResourceSubtype::EdPhysician).with_unrecorded_load(4),
            ResourceUnit::new("dr-b", ResourceSubtype::EdPhysician).with_unrecorded_load(2),
            ResourceUnit::new("dr-a", ResourceSubtype::EdPhysician).with_unrecorded_load(3),
            ResourceUnit::new("dr-d", ResourceSubtype::EdPhysician).with_unrecorded_load(2),
            ResourceUnit::new("VENT-01", ResourceSubtype::Ventilator),
        ];

        let ids: Vec<String> = least_busy_staff(&units)
            .into_iter()
            .map(|l| l.unit_id.to_string())
            .collect();
        assert_eq!(ids, vec!["dr-b", "dr-d", "dr-a", "dr-c"]);
    }

    #[test]
    fn test_occupancy_staff_uses_capacity() {
        let units = vec![
            ResourceUnit::new("RN-A", ResourceSubtype::EdNurse).with_unrecorded_load(4),
            ResourceUnit::new("RN-B", ResourceSubtype::EdNurse).with_unrecorded_load(1),
            ResourceUnit::new("ICU-1", ResourceSubtype::IcuBed).occupied_by(PatientId::new("P1")),
            ResourceUnit::new("ICU-2", ResourceSubtype::IcuBed),
        ];

        let rows = occupancy(&units);
        let icu = rows.iter().find(|r| r.subtype == ResourceSubtype::IcuBed).unwrap();
        assert_eq!(icu.occupied, 1);
        assert_eq!(icu.occupancy_percent, 50.0);

        let nurses = rows.iter().find(|r| r.subtype == ResourceSubtype::EdNurse).unwrap();
        assert_eq!(nurses.free, 2);
        assert_eq!(nurses.occupancy_percent, 50.0);
    }

    #[test]
    fn test_free_equipment_and_overload() {
        let units = vec![
            ResourceUnit::new("VENT-01", ResourceSubtype::Ventilator).occupied_by(PatientId::new("P1")),
            ResourceUnit::new("VENT-02", ResourceSubtype::Ventilator),
            ResourceUnit::new("DEFIB-01", ResourceSubtype::Defibrillator),
            ResourceUnit::new("DR-A", ResourceSubtype::EdPhysician).with_unrecorded_load(5),
            ResourceUnit::new("DR-B", ResourceSubtype::EdPhysician).with_unrecorded_load(1),
        ];

        let equipment = free_equipment(&units);
        assert_eq!(
            equipment,
            vec![
                EquipmentCount { subtype: ResourceSubtype::Ventilator, free: 1, total: 2 },
                EquipmentCount { subtype: ResourceSubtype::Defibrillator, free: 1, total: 1 },
            ]
        );

        let overloaded = overloaded_staff(&units);
        assert_eq!(overloaded.len(), 1);
        assert_eq!(overloaded[0].unit_id.as_str(), "DR-A");
    }
}
