//! Capacity alerts over a snapshot.
//!
//! Rules:
//! - `icu_capacity`: critical at the critical occupancy threshold, high at the high one
//! - `trauma_bay_shortage`: no trauma bay free (high)
//! - `physician_overload`: any ED physician at capacity (moderate)
//! - `ventilator_shortage`: no ventilator free (critical)
//! - `ventilator_limited`: few ventilators free (high)
//! - `<equipment>_shortage`: other equipment none free (high) or utilization at threshold (moderate)

use serde::{Deserialize, Serialize};

use crate::models::{ResourceKind, ResourceSubtype};
use crate::store::HospitalState;

/// Alert thresholds, percentages in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub icu_critical_occupancy: f64,
    pub icu_high_occupancy: f64,
    pub equipment_shortage_utilization: f64,
    /// Free ventilator count at or below which supply is limited
    pub ventilator_limited_at: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            icu_critical_occupancy: 90.0,
            icu_high_occupancy: 75.0,
            equipment_shortage_utilization: 80.0,
            ventilator_limited_at: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    None,
    Moderate,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::None => "NONE",
            AlertSeverity::Moderate => "MODERATE",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// One capacity problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityAlert {
    /// Reason code, e.g. `icu_capacity`
    pub code: String,
    pub severity: AlertSeverity,
    pub subtype: ResourceSubtype,
    /// Free units (or staff members at capacity, for overload alerts)
    pub count: u32,
    pub total: u32,
    pub utilization_percent: f64,
}

/// All alerts plus the overall severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub alerts: Vec<CapacityAlert>,
    pub severity: AlertSeverity,
    pub requires_intervention: bool,
}

struct Usage {
    free: u32,
    total: u32,
}

impl Usage {
    fn of(state: &HospitalState, subtype: ResourceSubtype) -> Self {
        let counts = state.count_by_status(subtype);
        Self {
            free: counts.free,
            total: counts.total(),
        }
    }

    fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.total - self.free) as f64 / self.total as f64 * 100.0
        }
    }

    fn alert(&self, code: impl Into<String>, severity: AlertSeverity, subtype: ResourceSubtype) -> CapacityAlert {
        CapacityAlert {
            code: code.into(),
            severity,
            subtype,
            count: self.free,
            total: self.total,
            utilization_percent: self.utilization(),
        }
    }
}

/// Evaluate every rule against a snapshot.
pub fn evaluate(state: &HospitalState, thresholds: &AlertThresholds) -> CapacityReport {
    let mut alerts = Vec::new();

    let icu = Usage::of(state, ResourceSubtype::IcuBed);
    if icu.total > 0 {
        if icu.utilization() >= thresholds.icu_critical_occupancy {
            alerts.push(icu.alert("icu_capacity", AlertSeverity::Critical, ResourceSubtype::IcuBed));
        } else if icu.utilization() >= thresholds.icu_high_occupancy {
            alerts.push(icu.alert("icu_capacity", AlertSeverity::High, ResourceSubtype::IcuBed));
        }
    }

    let bays = Usage::of(state, ResourceSubtype::TraumaBay);
    if bays.total > 0 && bays.free == 0 {
        alerts.push(bays.alert("trauma_bay_shortage", AlertSeverity::High, ResourceSubtype::TraumaBay));
    }

    let physicians: Vec<_> = state.units_of(ResourceSubtype::EdPhysician).collect();
    let overloaded = physicians.iter().filter(|u| u.spare_capacity() == 0).count() as u32;
    if overloaded > 0 {
        let total = physicians.len() as u32;
        alerts.push(CapacityAlert {
            code: "physician_overload".to_string(),
            severity: AlertSeverity::Moderate,
            subtype: ResourceSubtype::EdPhysician,
            count: overloaded,
            total,
            utilization_percent: overloaded as f64 / total as f64 * 100.0,
        });
    }

    let vents = Usage::of(state, ResourceSubtype::Ventilator);
    if vents.total > 0 {
        if vents.free == 0 {
            alerts.push(vents.alert("ventilator_shortage", AlertSeverity::Critical, ResourceSubtype::Ventilator));
        } else if vents.free <= thresholds.ventilator_limited_at {
            alerts.push(vents.alert("ventilator_limited", AlertSeverity::High, ResourceSubtype::Ventilator));
        }
    }

    for subtype in ResourceSubtype::ALL
        .into_iter()
        .filter(|s| s.kind() == ResourceKind::Equipment && *s != ResourceSubtype::Ventilator)
    {
        let usage = Usage::of(state, subtype);
        if usage.total == 0 {
            continue;
        }
        let code = format!("{}_shortage", subtype.as_str());
        if usage.free == 0 {
            alerts.push(usage.alert(code, AlertSeverity::High, subtype));
        } else if usage.utilization() >= thresholds.equipment_shortage_utilization {
            alerts.push(usage.alert(code, AlertSeverity::Moderate, subtype));
        }
    }

    let severity = alerts
        .iter()
        .map(|a| a.severity)
        .max()
        .unwrap_or(AlertSeverity::None);

    CapacityReport {
        requires_intervention: severity >= AlertSeverity::High,
        alerts,
        severity,
    }
}
