//! Patient intake models.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable patient identifier supplied by the intake layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PatientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Vital signs as recorded at intake. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    /// Heart rate in beats per minute
    #[serde(default)]
    pub heart_rate: Option<f64>,
    /// Systolic blood pressure in mmHg
    #[serde(default, alias = "bp_systolic")]
    pub systolic_bp: Option<f64>,
    /// Peripheral oxygen saturation in percent
    #[serde(default, alias = "o2_saturation")]
    pub oxygen_saturation: Option<f64>,
    /// Glasgow Coma Scale (3-15), when assessed
    #[serde(default)]
    pub gcs: Option<u8>,
}

impl VitalSigns {
    /// Convenience constructor for a fully recorded set of core vitals.
    pub fn new(heart_rate: f64, systolic_bp: f64, oxygen_saturation: f64) -> Self {
        Self {
            heart_rate: Some(heart_rate),
            systolic_bp: Some(systolic_bp),
            oxygen_saturation: Some(oxygen_saturation),
            gcs: None,
        }
    }

    pub fn with_gcs(mut self, gcs: u8) -> Self {
        self.gcs = Some(gcs);
        self
    }
}

/// A structured patient record handed over by the intake layer.
///
/// Immutable once scored within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientCase {
    /// Patient identifier (unique within a batch)
    pub patient_id: PatientId,
    /// Display name, if known
    #[serde(default)]
    pub name: Option<String>,
    /// Age in years
    pub age: u32,
    /// Recorded vitals
    #[serde(default)]
    pub vital_signs: VitalSigns,
    /// Presenting symptoms
    #[serde(default)]
    pub symptoms: Vec<String>,
    /// Relevant medical history
    #[serde(default)]
    pub medical_history: Vec<String>,
    /// Free-form clinical note (carried through, never interpreted)
    #[serde(default)]
    pub clinical_note: Option<String>,
}

impl PatientCase {
    /// Create a case with required fields and no recorded vitals.
    pub fn new(patient_id: impl Into<PatientId>, age: u32) -> Self {
        Self {
            patient_id: patient_id.into(),
            name: None,
            age,
            vital_signs: VitalSigns::default(),
            symptoms: Vec::new(),
            medical_history: Vec::new(),
            clinical_note: None,
        }
    }

    pub fn with_vitals(mut self, vital_signs: VitalSigns) -> Self {
        self.vital_signs = vital_signs;
        self
    }

    pub fn with_symptoms<I, S>(mut self, symptoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symptoms = symptoms.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let case = PatientCase::new("P100", 54)
            .with_vitals(VitalSigns::new(112.0, 95.0, 93.0).with_gcs(14))
            .with_symptoms(["chest pain"]);

        assert_eq!(case.patient_id.as_str(), "P100");
        assert_eq!(case.vital_signs.gcs, Some(14));
        assert_eq!(case.symptoms, vec!["chest pain".to_string()]);
    }

    #[test]
    fn test_deserialize_intake_record() {
        let json = r#"{
            "patient_id": "P7",
            "age": 67,
            "vital_signs": {"heart_rate": 128, "bp_systolic": 85, "oxygen_saturation": 89},
            "symptoms": ["difficulty breathing"]
        }"#;

        let case: PatientCase = serde_json::from_str(json).unwrap();
        assert_eq!(case.vital_signs.systolic_bp, Some(85.0));
        assert_eq!(case.vital_signs.gcs, None);
        assert!(case.medical_history.is_empty());
    }
}
