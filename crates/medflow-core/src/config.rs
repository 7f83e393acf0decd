//! Engine configuration and initial hospital inventory.
//!
//! A hospital file holds an `[engine]` table and an `[inventory]` table:
//!
//! ```toml
//! [engine]
//! snapshot_attempts = 3
//!
//! [engine.weights]
//! clinical = 0.4
//! survival = 0.3
//! wait = 0.2
//! age = 0.1
//!
//! [[inventory.beds]]
//! id = "ICU-1"
//! subtype = "icu_bed"
//! occupant = "P001"
//!
//! [[inventory.staff]]
//! id = "dr-smith"
//! name = "Dr. Smith"
//! role = "ed_physician"
//! workload = 3
//!
//! [[inventory.equipment]]
//! subtype = "ventilator"
//! total = 7
//! available = 2
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::{
    Department, ParseSubtypeError, PatientId, ResourceKind, ResourceSubtype, ResourceUnit, UnitId,
};
use crate::query::AlertThresholds;
use crate::resolver::PriorityWeights;
use crate::store::{StateStore, StoreError, DEFAULT_SNAPSHOT_ATTEMPTS};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    UnknownSubtype(#[from] ParseSubtypeError),

    #[error("Duplicate unit id: {0}")]
    DuplicateUnit(UnitId),

    #[error("Unit {0} has zero capacity")]
    ZeroCapacity(UnitId),

    #[error("Unit {unit} has workload {workload} above capacity {capacity}")]
    WorkloadExceedsCapacity {
        unit: UnitId,
        workload: u32,
        capacity: u32,
    },

    #[error("{subtype} pool lists {available} available out of {total}")]
    AvailableExceedsTotal {
        subtype: ResourceSubtype,
        available: u32,
        total: u32,
    },

    #[error("{subtype} is {kind}, not allowed under [[{section}]]")]
    SectionMismatch {
        subtype: ResourceSubtype,
        kind: ResourceKind,
        section: &'static str,
    },

    #[error("Invalid priority weights: {0}")]
    InvalidWeights(String),

    #[error("Snapshot attempts must be at least 1")]
    ZeroSnapshotAttempts,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables for scoring, snapshots and alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: PriorityWeights,
    /// Optimistic snapshot tries before quiescing writers
    pub snapshot_attempts: u32,
    pub alerts: AlertThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: PriorityWeights::default(),
            snapshot_attempts: DEFAULT_SNAPSHOT_ATTEMPTS,
            alerts: AlertThresholds::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let w = &self.weights;
        let terms = [w.clinical, w.survival, w.wait, w.age];
        if terms.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConfigError::InvalidWeights(format!(
                "weights must be non-negative, got {:?}",
                terms
            )));
        }
        if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!(
                "weights must sum to 1.0, got {}",
                w.sum()
            )));
        }
        if self.snapshot_attempts == 0 {
            return Err(ConfigError::ZeroSnapshotAttempts);
        }
        Ok(())
    }
}

/// A bed as listed in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedSpec {
    pub id: String,
    pub subtype: String,
    /// Defaults to the department the bed subtype admits to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Patient already in the bed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupant: Option<String>,
    /// Occupied by someone the engine does not track
    #[serde(default)]
    pub occupied: bool,
}

/// A staff member as listed in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: String,
    /// Department the member is assigned to; unassigned staff only match
    /// queries without a department filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub workload: u32,
    /// Defaults to the role's default capacity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

/// A pool of identical equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentPool {
    pub subtype: String,
    pub total: u32,
    pub available: u32,
}

/// Initial hospital state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub beds: Vec<BedSpec>,
    pub staff: Vec<StaffSpec>,
    pub equipment: Vec<EquipmentPool>,
}

impl Inventory {
    /// Built-in emergency department inventory.
    pub fn emergency_department() -> Self {
        let mut beds = Vec::new();
        for i in 1..=4 {
            beds.push(bed(format!("ICU-{}", i), "icu_bed"));
        }
        beds[0].occupant = Some("P001".to_string());
        beds[1].occupant = Some("P002".to_string());

        for i in 1..=3 {
            let mut bay = bed(format!("TB-{}", i), "trauma_bay");
            if i == 1 {
                bay.occupant = Some("P003".to_string());
            }
            beds.push(bay);
        }

        for i in 1..=15 {
            let mut room = bed(format!("TR-{:02}", i), "treatment_room");
            room.occupied = i <= 10;
            beds.push(room);
        }

        let staff = vec![
            staff("dr-smith", "Dr. Smith", "ed_physician", 3),
            staff("dr-jones", "Dr. Jones", "ed_physician", 2),
            staff("rn-johnson", "RN Johnson", "ed_nurse", 4),
            staff("rn-williams", "RN Williams", "ed_nurse", 3),
            staff("rn-davis", "RN Davis", "ed_nurse", 2),
            staff("dr-patel", "Dr. Patel", "cardiologist", 0),
            staff("dr-martinez", "Dr. Martinez", "trauma_surgeon", 0),
        ];

        let equipment = vec![
            pool("ventilator", 7, 2),
            pool("cardiac_monitor", 15, 8),
            pool("defibrillator", 8, 6),
        ];

        Self {
            beds,
            staff,
            equipment,
        }
    }

    /// Expand the inventory into units, validating as it goes.
    pub fn units(&self) -> ConfigResult<Vec<ResourceUnit>> {
        let mut units = Vec::new();

        for spec in &self.beds {
            let subtype = section_subtype(&spec.subtype, ResourceKind::Bed, "beds")?;
            let department = match &spec.department {
                Some(name) => name.parse()?,
                None => home_department(subtype),
            };
            let mut unit = ResourceUnit::new(spec.id.as_str(), subtype).in_department(department);
            if let Some(patient) = &spec.occupant {
                unit = unit.occupied_by(PatientId::new(patient.as_str()));
            } else if spec.occupied {
                unit = unit.with_unrecorded_load(1);
            }
            units.push(unit);
        }

        for spec in &self.staff {
            let subtype = section_subtype(&spec.role, ResourceKind::Staff, "staff")?;
            let id = UnitId::new(spec.id.as_str());
            let capacity = spec.capacity.unwrap_or_else(|| subtype.default_capacity());
            if capacity == 0 {
                return Err(ConfigError::ZeroCapacity(id));
            }
            if spec.workload > capacity {
                return Err(ConfigError::WorkloadExceedsCapacity {
                    unit: id,
                    workload: spec.workload,
                    capacity,
                });
            }
            let mut unit = ResourceUnit::new(id, subtype)
                .with_capacity(capacity)
                .with_unrecorded_load(spec.workload);
            if let Some(name) = &spec.name {
                unit = unit.named(name.as_str());
            }
            if let Some(department) = &spec.department {
                unit = unit.in_department(department.parse()?);
            }
            units.push(unit);
        }

        for spec in &self.equipment {
            let subtype = section_subtype(&spec.subtype, ResourceKind::Equipment, "equipment")?;
            if spec.available > spec.total {
                return Err(ConfigError::AvailableExceedsTotal {
                    subtype,
                    available: spec.available,
                    total: spec.total,
                });
            }
            let in_use = spec.total - spec.available;
            for n in 1..=spec.total {
                let unit = ResourceUnit::new(format!("{}-{:02}", subtype.id_prefix(), n), subtype);
                units.push(if n <= in_use {
                    unit.with_unrecorded_load(1)
                } else {
                    unit
                });
            }
        }

        let mut seen = BTreeSet::new();
        for unit in &units {
            if !seen.insert(&unit.id) {
                return Err(ConfigError::DuplicateUnit(unit.id.clone()));
            }
        }

        Ok(units)
    }
}

/// Engine settings plus inventory, as loaded from one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HospitalConfig {
    pub engine: EngineConfig,
    pub inventory: Inventory,
}

impl HospitalConfig {
    /// Built-in inventory with default engine settings.
    pub fn emergency_department() -> Self {
        Self {
            engine: EngineConfig::default(),
            inventory: Inventory::emergency_department(),
        }
    }

    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: HospitalConfig = toml::from_str(contents)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Build the state store described by this configuration.
    pub fn build_store(&self) -> ConfigResult<StateStore> {
        self.engine.validate()?;
        let units = self.inventory.units()?;
        let count = units.len();
        let store = StateStore::new(units)?.with_snapshot_attempts(self.engine.snapshot_attempts);
        info!(units = count, "Hospital state initialized");
        Ok(store)
    }
}

fn section_subtype(
    name: &str,
    expected: ResourceKind,
    section: &'static str,
) -> ConfigResult<ResourceSubtype> {
    let subtype: ResourceSubtype = name.parse()?;
    if subtype.kind() != expected {
        return Err(ConfigError::SectionMismatch {
            subtype,
            kind: subtype.kind(),
            section,
        });
    }
    Ok(subtype)
}

fn home_department(bed: ResourceSubtype) -> Department {
    match bed {
        ResourceSubtype::IcuBed => Department::Icu,
        ResourceSubtype::TraumaBay => Department::EdTrauma,
        ResourceSubtype::GeneralBed => Department::GeneralFloor,
        _ => Department::EdTreatment,
    }
}

fn bed(id: String, subtype: &str) -> BedSpec {
    BedSpec {
        id,
        subtype: subtype.to_string(),
        department: None,
        occupant: None,
        occupied: false,
    }
}

fn staff(id: &str, name: &str, role: &str, workload: u32) -> StaffSpec {
    StaffSpec {
        id: id.to_string(),
        name: Some(name.to_string()),
        role: role.to_string(),
        department: None,
        workload,
        capacity: None,
    }
}

fn pool(subtype: &str, total: u32, available: u32) -> EquipmentPool {
    EquipmentPool {
        subtype: subtype.to_string(),
        total,
        available,
    }
}
