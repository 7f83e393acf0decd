//! Age and vital-sign sub-scores.
//!
//! Each vital maps to a bounded sub-score. A missing or physiologically
//! impossible reading scores at that vital's maximum and is flagged, since
//! under-triage is the costlier error.

use crate::models::{RiskFactor, VitalSign};

pub const MAX_AGE_POINTS: u8 = 3;
pub const MAX_HEART_RATE_POINTS: u8 = 3;
pub const MAX_BLOOD_PRESSURE_POINTS: u8 = 4;
pub const MAX_OXYGEN_POINTS: u8 = 5;

/// Accepted heart rate readings (bpm).
const HEART_RATE_RANGE: (f64, f64) = (1.0, 300.0);
/// Accepted systolic readings (mmHg).
const SYSTOLIC_RANGE: (f64, f64) = (1.0, 300.0);
/// Accepted saturation readings (%).
const OXYGEN_RANGE: (f64, f64) = (1.0, 100.0);
/// Glasgow Coma Scale bounds.
const GCS_RANGE: (u8, u8) = (3, 15);

/// One scored vital.
#[derive(Debug, Clone, PartialEq)]
pub struct VitalScore {
    pub points: u8,
    pub factor: Option<RiskFactor>,
    /// Set when the reading was missing or out of range
    pub degraded: Option<VitalSign>,
}

impl VitalScore {
    fn normal() -> Self {
        Self {
            points: 0,
            factor: None,
            degraded: None,
        }
    }

    fn flagged(points: u8, factor: RiskFactor) -> Self {
        Self {
            points,
            factor: Some(factor),
            degraded: None,
        }
    }

    fn unreliable(vital: VitalSign, points: u8) -> Self {
        Self {
            points,
            factor: Some(RiskFactor::UnreliableVital { vital }),
            degraded: Some(vital),
        }
    }
}

fn in_range(value: Option<f64>, range: (f64, f64)) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= range.0 && *v <= range.1)
}

/// Age adjustment (0-3), highest at the extremes of life.
pub fn score_age(age: u32) -> VitalScore {
    if age > 75 {
        VitalScore::flagged(3, RiskFactor::AdvancedAge { age })
    } else if age > 65 {
        VitalScore::flagged(2, RiskFactor::Elderly { age })
    } else if age < 1 {
        VitalScore::flagged(2, RiskFactor::Infant { age })
    } else {
        VitalScore::normal()
    }
}

/// Heart-rate deviation from the 60-100 bpm band (0-3).
pub fn score_heart_rate(heart_rate: Option<f64>) -> VitalScore {
    let Some(bpm) = in_range(heart_rate, HEART_RATE_RANGE) else {
        return VitalScore::unreliable(VitalSign::HeartRate, MAX_HEART_RATE_POINTS);
    };

    if bpm > 130.0 || bpm < 50.0 {
        VitalScore::flagged(3, RiskFactor::CriticalHeartRate { bpm })
    } else if bpm > 110.0 || bpm < 60.0 {
        VitalScore::flagged(2, RiskFactor::AbnormalHeartRate { bpm })
    } else if bpm > 100.0 {
        VitalScore::flagged(1, RiskFactor::Tachycardia { bpm })
    } else {
        VitalScore::normal()
    }
}

/// Systolic deviation from the 90-140 mmHg band (0-4). Low pressure scores higher.
pub fn score_systolic(systolic_bp: Option<f64>) -> VitalScore {
    let Some(mmhg) = in_range(systolic_bp, SYSTOLIC_RANGE) else {
        return VitalScore::unreliable(VitalSign::SystolicBp, MAX_BLOOD_PRESSURE_POINTS);
    };

    if mmhg < 90.0 {
        VitalScore::flagged(4, RiskFactor::Hypotension { mmhg })
    } else if mmhg > 180.0 {
        VitalScore::flagged(2, RiskFactor::SevereHypertension { mmhg })
    } else if mmhg > 140.0 {
        VitalScore::flagged(1, RiskFactor::Hypertension { mmhg })
    } else {
        VitalScore::normal()
    }
}

/// Saturation deficit below 95% (0-5), steep below 90%.
pub fn score_oxygen(oxygen_saturation: Option<f64>) -> VitalScore {
    let Some(percent) = in_range(oxygen_saturation, OXYGEN_RANGE) else {
        return VitalScore::unreliable(VitalSign::OxygenSaturation, MAX_OXYGEN_POINTS);
    };

    if percent < 88.0 {
        VitalScore::flagged(5, RiskFactor::CriticalHypoxia { percent })
    } else if percent < 92.0 {
        VitalScore::flagged(3, RiskFactor::Hypoxia { percent })
    } else if percent < 95.0 {
        VitalScore::flagged(1, RiskFactor::LowOxygen { percent })
    } else {
        VitalScore::normal()
    }
}

/// Level of consciousness from GCS, when assessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consciousness {
    NotAssessed,
    Alert,
    /// GCS 9-12
    Impaired(u8),
    /// GCS 3-8
    Depressed(u8),
}

impl Consciousness {
    /// Points contributed to the symptom sub-score.
    pub fn points(&self) -> u8 {
        match self {
            Consciousness::Depressed(_) => 4,
            Consciousness::Impaired(_) => 2,
            Consciousness::NotAssessed | Consciousness::Alert => 0,
        }
    }

    pub fn factor(&self) -> Option<RiskFactor> {
        match *self {
            Consciousness::Depressed(gcs) => Some(RiskFactor::DepressedConsciousness { gcs }),
            Consciousness::Impaired(gcs) => Some(RiskFactor::ImpairedConsciousness { gcs }),
            Consciousness::NotAssessed | Consciousness::Alert => None,
        }
    }

    pub fn is_depressed(&self) -> bool {
        matches!(self, Consciousness::Depressed(_))
    }
}

/// Classify GCS. An out-of-range value is treated as the worst score.
pub fn assess_gcs(gcs: Option<u8>) -> (Consciousness, Option<VitalSign>) {
    match gcs {
        None => (Consciousness::NotAssessed, None),
        Some(value) if value < GCS_RANGE.0 || value > GCS_RANGE.1 => {
            (Consciousness::Depressed(GCS_RANGE.0), Some(VitalSign::Gcs))
        }
        Some(value) if value <= 8 => (Consciousness::Depressed(value), None),
        Some(value) if value <= 12 => (Consciousness::Impaired(value), None),
        Some(_) => (Consciousness::Alert, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_extremes() {
        assert_eq!(score_age(80).points, 3);
        assert_eq!(score_age(70).points, 2);
        assert_eq!(score_age(0).points, 2);
        assert_eq!(score_age(35).points, 0);
    }

    #[test]
    fn test_heart_rate_bands() {
        assert_eq!(score_heart_rate(Some(80.0)).points, 0);
        assert_eq!(score_heart_rate(Some(105.0)).points, 1);
        assert_eq!(score_heart_rate(Some(115.0)).points, 2);
        assert_eq!(score_heart_rate(Some(55.0)).points, 2);
        assert_eq!(score_heart_rate(Some(140.0)).points, 3);
        assert_eq!(score_heart_rate(Some(45.0)).points, 3);
    }

    #[test]
    fn test_low_pressure_scores_higher() {
        assert_eq!(score_systolic(Some(120.0)).points, 0);
        assert_eq!(score_systolic(Some(150.0)).points, 1);
        assert_eq!(score_systolic(Some(190.0)).points, 2);
        assert_eq!(score_systolic(Some(85.0)).points, 4);
    }

    #[test]
    fn test_oxygen_penalty() {
        assert_eq!(score_oxygen(Some(98.0)).points, 0);
        assert_eq!(score_oxygen(Some(94.0)).points, 1);
        assert_eq!(score_oxygen(Some(90.0)).points, 3);
        assert_eq!(score_oxygen(Some(85.0)).points, 5);
    }

    #[test]
    fn test_missing_vitals_score_worst() {
        let hr = score_heart_rate(None);
        assert_eq!(hr.points, MAX_HEART_RATE_POINTS);
        assert_eq!(hr.degraded, Some(VitalSign::HeartRate));

        assert_eq!(score_systolic(Some(f64::NAN)).points, MAX_BLOOD_PRESSURE_POINTS);
        assert_eq!(score_oxygen(Some(140.0)).degraded, Some(VitalSign::OxygenSaturation));
        assert_eq!(score_heart_rate(Some(-20.0)).points, MAX_HEART_RATE_POINTS);
    }

    #[test]
    fn test_gcs_classification() {
        assert_eq!(assess_gcs(None), (Consciousness::NotAssessed, None));
        assert_eq!(assess_gcs(Some(15)), (Consciousness::Alert, None));
        assert_eq!(assess_gcs(Some(10)), (Consciousness::Impaired(10), None));
        assert_eq!(assess_gcs(Some(6)), (Consciousness::Depressed(6), None));
        assert_eq!(
            assess_gcs(Some(40)),
            (Consciousness::Depressed(3), Some(VitalSign::Gcs))
        );
    }
}
