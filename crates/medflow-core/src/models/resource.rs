//! Resource models: beds, staff and equipment units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use thiserror::Error;

use super::assessment::Department;
use super::patient::PatientId;

/// Minimum similarity before a misspelled subtype gets a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.80;

/// Top-level resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Bed,
    Staff,
    Equipment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bed => "bed",
            ResourceKind::Staff => "staff",
            ResourceKind::Equipment => "equipment",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ParseSubtypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match canonical_key(s).trim_end_matches('s') {
            "bed" => Ok(ResourceKind::Bed),
            "staff" => Ok(ResourceKind::Staff),
            "equipment" => Ok(ResourceKind::Equipment),
            _ => Err(ParseSubtypeError {
                input: s.to_string(),
                suggestion: None,
            }),
        }
    }
}

/// Closed set of allocatable resource subtypes.
///
/// Declaration order doubles as the stable tie-break order wherever
/// subtypes are sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSubtype {
    IcuBed,
    TraumaBay,
    TreatmentRoom,
    GeneralBed,
    EdPhysician,
    EdNurse,
    Cardiologist,
    Neurologist,
    TraumaSurgeon,
    Ventilator,
    CardiacMonitor,
    Defibrillator,
}

impl ResourceSubtype {
    pub const ALL: [ResourceSubtype; 12] = [
        ResourceSubtype::IcuBed,
        ResourceSubtype::TraumaBay,
        ResourceSubtype::TreatmentRoom,
        ResourceSubtype::GeneralBed,
        ResourceSubtype::EdPhysician,
        ResourceSubtype::EdNurse,
        ResourceSubtype::Cardiologist,
        ResourceSubtype::Neurologist,
        ResourceSubtype::TraumaSurgeon,
        ResourceSubtype::Ventilator,
        ResourceSubtype::CardiacMonitor,
        ResourceSubtype::Defibrillator,
    ];

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSubtype::IcuBed
            | ResourceSubtype::TraumaBay
            | ResourceSubtype::TreatmentRoom
            | ResourceSubtype::GeneralBed => ResourceKind::Bed,
            ResourceSubtype::EdPhysician
            | ResourceSubtype::EdNurse
            | ResourceSubtype::Cardiologist
            | ResourceSubtype::Neurologist
            | ResourceSubtype::TraumaSurgeon => ResourceKind::Staff,
            ResourceSubtype::Ventilator
            | ResourceSubtype::CardiacMonitor
            | ResourceSubtype::Defibrillator => ResourceKind::Equipment,
        }
    }

    /// Beds and equipment hold at most one patient; staff are shared.
    pub fn is_exclusive(&self) -> bool {
        self.kind() != ResourceKind::Staff
    }

    /// Snake-case code used in reason codes and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceSubtype::IcuBed => "icu_bed",
            ResourceSubtype::TraumaBay => "trauma_bay",
            ResourceSubtype::TreatmentRoom => "treatment_room",
            ResourceSubtype::GeneralBed => "general_bed",
            ResourceSubtype::EdPhysician => "ed_physician",
            ResourceSubtype::EdNurse => "ed_nurse",
            ResourceSubtype::Cardiologist => "cardiologist",
            ResourceSubtype::Neurologist => "neurologist",
            ResourceSubtype::TraumaSurgeon => "trauma_surgeon",
            ResourceSubtype::Ventilator => "ventilator",
            ResourceSubtype::CardiacMonitor => "cardiac_monitor",
            ResourceSubtype::Defibrillator => "defibrillator",
        }
    }

    /// Human-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            ResourceSubtype::IcuBed => "ICU bed",
            ResourceSubtype::TraumaBay => "Trauma bay",
            ResourceSubtype::TreatmentRoom => "ED treatment room",
            ResourceSubtype::GeneralBed => "General floor bed",
            ResourceSubtype::EdPhysician => "ED physician",
            ResourceSubtype::EdNurse => "ED nurse",
            ResourceSubtype::Cardiologist => "Cardiologist",
            ResourceSubtype::Neurologist => "Neurologist",
            ResourceSubtype::TraumaSurgeon => "Trauma surgeon",
            ResourceSubtype::Ventilator => "Ventilator",
            ResourceSubtype::CardiacMonitor => "Cardiac monitor",
            ResourceSubtype::Defibrillator => "Defibrillator",
        }
    }

    /// Identifier prefix for units expanded from a pool.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ResourceSubtype::IcuBed => "ICU",
            ResourceSubtype::TraumaBay => "TB",
            ResourceSubtype::TreatmentRoom => "TR",
            ResourceSubtype::GeneralBed => "GEN",
            ResourceSubtype::EdPhysician => "PHY",
            ResourceSubtype::EdNurse => "RN",
            ResourceSubtype::Cardiologist => "CARD",
            ResourceSubtype::Neurologist => "NEURO",
            ResourceSubtype::TraumaSurgeon => "TSURG",
            ResourceSubtype::Ventilator => "VENT",
            ResourceSubtype::CardiacMonitor => "MON",
            ResourceSubtype::Defibrillator => "DEFIB",
        }
    }

    /// Default concurrent patient capacity. Exclusive units always hold one.
    pub fn default_capacity(&self) -> u32 {
        match self {
            ResourceSubtype::EdPhysician | ResourceSubtype::EdNurse => 5,
            _ => 1,
        }
    }

    /// Rank used to order a patient's needs: life support first, consults last.
    /// Lower is more urgent.
    pub fn clinical_urgency(&self) -> u8 {
        match self {
            ResourceSubtype::Ventilator => 0,
            ResourceSubtype::Defibrillator => 1,
            ResourceSubtype::IcuBed => 2,
            ResourceSubtype::TraumaBay => 3,
            ResourceSubtype::TraumaSurgeon => 4,
            ResourceSubtype::EdPhysician => 5,
            ResourceSubtype::CardiacMonitor => 6,
            ResourceSubtype::TreatmentRoom => 7,
            ResourceSubtype::Cardiologist => 8,
            ResourceSubtype::Neurologist => 9,
            ResourceSubtype::EdNurse => 10,
            ResourceSubtype::GeneralBed => 11,
        }
    }

    /// Bed substitutes, in preference order, when this bed subtype is exhausted.
    pub fn bed_alternates(&self) -> &'static [ResourceSubtype] {
        match self {
            ResourceSubtype::IcuBed => &[ResourceSubtype::TraumaBay, ResourceSubtype::TreatmentRoom],
            ResourceSubtype::TraumaBay => &[ResourceSubtype::TreatmentRoom],
            ResourceSubtype::TreatmentRoom => &[ResourceSubtype::GeneralBed],
            _ => &[],
        }
    }

    /// Spellings accepted from configuration and callers.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            ResourceSubtype::IcuBed => &["icu", "icu_bed", "icu_beds"],
            ResourceSubtype::TraumaBay => &["trauma_bay", "trauma_bays", "ed_trauma", "ed_trauma_bays"],
            ResourceSubtype::TreatmentRoom => &[
                "treatment_room",
                "treatment_rooms",
                "ed_treatment",
                "ed_treatment_rooms",
            ],
            ResourceSubtype::GeneralBed => &["general_bed", "general_beds", "general_floor"],
            ResourceSubtype::EdPhysician => &["ed_physician", "ed_physicians", "physician", "physicians"],
            ResourceSubtype::EdNurse => &["ed_nurse", "ed_nurses", "nurse", "nurses"],
            ResourceSubtype::Cardiologist => &["cardiologist", "cardiologists", "cardiology"],
            ResourceSubtype::Neurologist => &["neurologist", "neurologists", "neurology"],
            ResourceSubtype::TraumaSurgeon => &["trauma_surgeon", "trauma_surgeons"],
            ResourceSubtype::Ventilator => &["ventilator", "ventilators", "vent"],
            ResourceSubtype::CardiacMonitor => &["cardiac_monitor", "cardiac_monitors", "monitor"],
            ResourceSubtype::Defibrillator => &["defibrillator", "defibrillators", "defib"],
        }
    }
}

impl fmt::Display for ResourceSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource subtype string that matched no known subtype.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unknown resource type '{input}'{}", .suggestion.map(|s| format!(" (did you mean '{}'?)", s)).unwrap_or_default())]
pub struct ParseSubtypeError {
    pub input: String,
    pub suggestion: Option<&'static str>,
}

impl FromStr for ResourceSubtype {
    type Err = ParseSubtypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = canonical_key(s);

        for subtype in ResourceSubtype::ALL {
            if subtype.aliases().contains(&key.as_str()) {
                return Ok(subtype);
            }
        }

        let suggestion = ResourceSubtype::ALL
            .iter()
            .map(|subtype| (subtype.as_str(), jaro_winkler(&key, subtype.as_str())))
            .filter(|(_, similarity)| *similarity >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(code, _)| code);

        Err(ParseSubtypeError {
            input: s.to_string(),
            suggestion,
        })
    }
}

fn canonical_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Resource unit identifier (e.g. "ICU-3", "VENT-02", "dr-jones").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UnitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Observable unit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Free,
    Reserved,
    Occupied,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Free => "FREE",
            UnitStatus::Reserved => "RESERVED",
            UnitStatus::Occupied => "OCCUPIED",
        }
    }
}

/// State of a single claim on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Reserved,
    Occupied,
}

/// Who holds a claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Holder {
    /// A patient known to the engine
    Patient(PatientId),
    /// Load that predates the engine (seeded occupancy or workload)
    Unrecorded,
}

impl Holder {
    pub fn patient(&self) -> Option<&PatientId> {
        match self {
            Holder::Patient(id) => Some(id),
            Holder::Unrecorded => None,
        }
    }
}

/// One patient's hold on a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub holder: Holder,
    pub state: ClaimState,
}

impl Claim {
    pub fn reserved(patient: PatientId) -> Self {
        Self {
            holder: Holder::Patient(patient),
            state: ClaimState::Reserved,
        }
    }

    pub fn unrecorded() -> Self {
        Self {
            holder: Holder::Unrecorded,
            state: ClaimState::Occupied,
        }
    }

    pub fn is_held_by(&self, patient: &PatientId) -> bool {
        self.holder.patient() == Some(patient)
    }
}

/// A bed, staff member or equipment item.
///
/// Exclusive units (beds, equipment) have capacity 1. Staff carry a
/// capacity and their workload is the number of claims held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUnit {
    /// Unit identifier, unique across the hospital
    pub id: UnitId,
    /// Resource subtype (determines kind)
    pub subtype: ResourceSubtype,
    /// Owning department, if the unit belongs to one
    pub department: Option<Department>,
    /// Display name (staff names, room labels)
    pub name: Option<String>,
    /// Maximum concurrent claims
    pub capacity: u32,
    /// Current claims, oldest first
    pub claims: Vec<Claim>,
    /// Store revision of the last mutation applied to this unit
    pub version: u64,
}

impl ResourceUnit {
    /// Create a free unit with the subtype's default capacity.
    pub fn new(id: impl Into<UnitId>, subtype: ResourceSubtype) -> Self {
        Self {
            id: id.into(),
            subtype,
            department: None,
            name: None,
            capacity: subtype.default_capacity(),
            claims: Vec::new(),
            version: 0,
        }
    }

    pub fn in_department(mut self, department: Department) -> Self {
        self.department = Some(department);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Seed pre-existing load that the engine did not allocate.
    pub fn with_unrecorded_load(mut self, count: u32) -> Self {
        self.claims.extend((0..count).map(|_| Claim::unrecorded()));
        self
    }

    /// Seed a pre-existing occupant.
    pub fn occupied_by(mut self, patient: PatientId) -> Self {
        self.claims.push(Claim {
            holder: Holder::Patient(patient),
            state: ClaimState::Occupied,
        });
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.subtype.kind()
    }

    pub fn is_exclusive(&self) -> bool {
        self.subtype.is_exclusive()
    }

    /// Number of patients currently held.
    pub fn workload(&self) -> u32 {
        self.claims.len() as u32
    }

    /// Claims that can still be accepted.
    pub fn spare_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.workload())
    }

    pub fn status(&self) -> UnitStatus {
        if self.workload() < self.capacity {
            UnitStatus::Free
        } else if self.claims.iter().any(|c| c.state == ClaimState::Reserved) {
            UnitStatus::Reserved
        } else {
            UnitStatus::Occupied
        }
    }

    pub fn is_free(&self) -> bool {
        self.status() == UnitStatus::Free
    }

    /// The claim held by a patient, if any.
    pub fn claim_of(&self, patient: &PatientId) -> Option<&Claim> {
        self.claims.iter().find(|c| c.is_held_by(patient))
    }

    /// Whether this unit satisfies reservation criteria (ignoring availability).
    pub fn matches(&self, subtype: ResourceSubtype, department: Option<Department>) -> bool {
        self.subtype == subtype && department.map_or(true, |d| self.department == Some(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subtype_aliases() {
        assert_eq!("ICU".parse::<ResourceSubtype>().unwrap(), ResourceSubtype::IcuBed);
        assert_eq!("ventilators".parse::<ResourceSubtype>().unwrap(), ResourceSubtype::Ventilator);
        assert_eq!("ED_Physician".parse::<ResourceSubtype>().unwrap(), ResourceSubtype::EdPhysician);
        assert_eq!("Trauma Surgeon".parse::<ResourceSubtype>().unwrap(), ResourceSubtype::TraumaSurgeon);
        assert_eq!("ed-trauma".parse::<ResourceSubtype>().unwrap(), ResourceSubtype::TraumaBay);
    }

    #[test]
    fn test_parse_subtype_suggests_close_match() {
        let err = "ventilater".parse::<ResourceSubtype>().unwrap_err();
        assert_eq!(err.suggestion, Some("ventilator"));
        assert!(err.to_string().contains("did you mean"));

        let err = "helicopter".parse::<ResourceSubtype>().unwrap_err();
        assert_eq!(err.suggestion, None);
    }

    #[test]
    fn test_kind_and_exclusivity() {
        assert_eq!(ResourceSubtype::IcuBed.kind(), ResourceKind::Bed);
        assert_eq!(ResourceSubtype::EdNurse.kind(), ResourceKind::Staff);
        assert!(ResourceSubtype::Ventilator.is_exclusive());
        assert!(!ResourceSubtype::Cardiologist.is_exclusive());
    }

    #[test]
    fn test_life_support_outranks_consults() {
        assert!(ResourceSubtype::Ventilator.clinical_urgency() < ResourceSubtype::Cardiologist.clinical_urgency());
        assert!(ResourceSubtype::IcuBed.clinical_urgency() < ResourceSubtype::Neurologist.clinical_urgency());
    }

    #[test]
    fn test_unit_status() {
        let bed = ResourceUnit::new("ICU-1", ResourceSubtype::IcuBed);
        assert_eq!(bed.status(), UnitStatus::Free);

        let mut held = bed.clone();
        held.claims.push(Claim::reserved("P1".into()));
        assert_eq!(held.status(), UnitStatus::Reserved);
        assert!(held.claim_of(&"P1".into()).is_some());

        let occupied = bed.occupied_by("P0".into());
        assert_eq!(occupied.status(), UnitStatus::Occupied);
    }

    #[test]
    fn test_staff_workload() {
        let nurse = ResourceUnit::new("rn-davis", ResourceSubtype::EdNurse).with_unrecorded_load(2);
        assert_eq!(nurse.workload(), 2);
        assert_eq!(nurse.spare_capacity(), 3);
        assert!(nurse.is_free());

        let full = nurse.with_unrecorded_load(3);
        assert_eq!(full.status(), UnitStatus::Occupied);
    }
}
