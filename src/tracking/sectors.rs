//! Angular sector partition of one device.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::{PI, TAU};
use uuid::Uuid;

use super::circular::{ArcRange, FULL_TURN};

pub type SectorId = Uuid;

const M2_PER_HECTARE: f64 = 10_000.0;

/// Sector definition as received from the configuration workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorSpec {
    pub id: SectorId,
    pub numero: i32,
    pub angulo_inicio: f64,
    pub angulo_fin: f64,
    pub radio_interno_m: f64,
    pub radio_externo_m: f64,
    pub coeficiente_riego: f64,
    pub prioridad: i32,
    pub activo: bool,
}

/// A validated sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub id: SectorId,
    pub numero: i32,
    pub range: ArcRange,
    pub radio_interno_m: f64,
    pub radio_externo_m: f64,
    pub coeficiente_riego: f64,
    pub prioridad: i32,
    pub activo: bool,
}

impl Sector {
    /// Pie-slice area out to the outer radius, in square meters.
    #[must_use]
    pub fn area_m2(&self) -> f64 {
        (self.range.span().to_radians() / TAU) * PI * self.radio_externo_m.powi(2)
    }

    #[must_use]
    pub fn area_ha(&self) -> f64 {
        self.area_m2() / M2_PER_HECTARE
    }

    #[must_use]
    pub fn to_spec(&self) -> SectorSpec {
        SectorSpec {
            id: self.id,
            numero: self.numero,
            angulo_inicio: self.range.start,
            angulo_fin: self.range.end_degrees(),
            radio_interno_m: self.radio_interno_m,
            radio_externo_m: self.radio_externo_m,
            coeficiente_riego: self.coeficiente_riego,
            prioridad: self.prioridad,
            activo: self.activo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NonFiniteAngle,
    AngleOutOfRange,
    EmptyRange,
    NonPositiveCoefficient,
    InvalidRadius,
    DuplicateId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidSector {
    pub sector_id: SectorId,
    pub numero: i32,
    pub reason: InvalidReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorConflict {
    pub sector_a: SectorId,
    pub numero_a: i32,
    pub sector_b: SectorId,
    pub numero_b: i32,
}

/// Rejection of a whole sector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error(
    "invalid sector configuration: {} overlapping pairs, {} invalid sectors",
    conflicts.len(),
    invalid.len()
)]
pub struct SectorValidationError {
    pub conflicts: Vec<SectorConflict>,
    pub invalid: Vec<InvalidSector>,
}

/// Validated, non-overlapping sectors of one device, ordered by start angle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorSet {
    sectors: Vec<Sector>,
}

impl SectorSet {
    /// Validate a full configuration. Nothing is applied unless every entry
    /// is valid and no two active sectors overlap.
    ///
    /// # Errors
    ///
    /// Returns every invalid entry and every overlapping pair found.
    pub fn validate(specs: Vec<SectorSpec>) -> Result<Self, SectorValidationError> {
        let mut invalid = Vec::new();
        let mut seen = HashSet::new();
        let mut sectors = Vec::with_capacity(specs.len());

        for spec in specs {
            let reason = check_spec(&spec);
            let reason = if reason.is_none() && !seen.insert(spec.id) {
                Some(InvalidReason::DuplicateId)
            } else {
                reason
            };

            if let Some(reason) = reason {
                invalid.push(InvalidSector {
                    sector_id: spec.id,
                    numero: spec.numero,
                    reason,
                });
                continue;
            }

            sectors.push(Sector {
                id: spec.id,
                numero: spec.numero,
                range: ArcRange::new(spec.angulo_inicio, spec.angulo_fin),
                radio_interno_m: spec.radio_interno_m,
                radio_externo_m: spec.radio_externo_m,
                coeficiente_riego: spec.coeficiente_riego,
                prioridad: spec.prioridad,
                activo: spec.activo,
            });
        }

        let conflicts = find_conflicts(&sectors);
        if !invalid.is_empty() || !conflicts.is_empty() {
            return Err(SectorValidationError { conflicts, invalid });
        }

        sectors.sort_by(|a, b| a.range.start.total_cmp(&b.range.start));
        Ok(Self { sectors })
    }

    /// Return a copy with one sector's active flag changed, re-validated.
    ///
    /// Returns `None` when the sector is not part of the set.
    ///
    /// # Errors
    ///
    /// Activating a sector that overlaps another active one is rejected.
    pub fn with_active(
        &self,
        sector_id: SectorId,
        activo: bool,
    ) -> Option<Result<Self, SectorValidationError>> {
        self.get(sector_id)?;
        let specs = self
            .sectors
            .iter()
            .map(|s| {
                let mut spec = s.to_spec();
                if s.id == sector_id {
                    spec.activo = activo;
                }
                spec
            })
            .collect();
        Some(Self::validate(specs))
    }

    /// The unique active sector containing `angle`, if any.
    #[must_use]
    pub fn resolve(&self, angle: f64) -> Option<&Sector> {
        if !angle.is_finite() {
            return None;
        }
        self.sectors
            .iter()
            .find(|s| s.activo && s.range.contains(angle))
    }

    #[must_use]
    pub fn get(&self, sector_id: SectorId) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.id == sector_id)
    }

    #[must_use]
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sectors.len()
    }
}

fn check_spec(spec: &SectorSpec) -> Option<InvalidReason> {
    let angles = [spec.angulo_inicio, spec.angulo_fin];
    if angles.iter().any(|a| !a.is_finite()) {
        return Some(InvalidReason::NonFiniteAngle);
    }
    if angles.iter().any(|a| !(0.0..=FULL_TURN).contains(a)) {
        return Some(InvalidReason::AngleOutOfRange);
    }
    if ArcRange::new(spec.angulo_inicio, spec.angulo_fin).is_empty() {
        return Some(InvalidReason::EmptyRange);
    }
    if !spec.coeficiente_riego.is_finite() || spec.coeficiente_riego <= 0.0 {
        return Some(InvalidReason::NonPositiveCoefficient);
    }
    let radii_ok = spec.radio_externo_m.is_finite()
        && spec.radio_interno_m.is_finite()
        && spec.radio_externo_m > 0.0
        && spec.radio_interno_m >= 0.0
        && spec.radio_interno_m < spec.radio_externo_m;
    if !radii_ok {
        return Some(InvalidReason::InvalidRadius);
    }
    None
}

fn find_conflicts(sectors: &[Sector]) -> Vec<SectorConflict> {
    let active: Vec<&Sector> = sectors.iter().filter(|s| s.activo).collect();
    let mut conflicts = Vec::new();
    for (i, a) in active.iter().enumerate() {
        for b in &active[i + 1..] {
            if a.range.overlaps(&b.range) {
                conflicts.push(SectorConflict {
                    sector_a: a.id,
                    numero_a: a.numero,
                    sector_b: b.id,
                    numero_b: b.numero,
                });
            }
        }
    }
    conflicts
}
