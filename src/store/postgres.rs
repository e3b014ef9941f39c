//! PostgreSQL store backed by sea-orm.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use super::{DeviceCommit, IrrigationStore, PivotCenter, StoredDevice};
use crate::entity::{
    device_live_state, device_stats, devices, pivot_centers, position_samples, sectors, vueltas,
};
use crate::tracking::{
    CloseReason, DeviceKind, DeviceProfile, FlowConfig, SectorId, SectorSpec, StatsAggregator,
    TrackerCheckpoint, Vuelta,
};

#[derive(Clone)]
pub struct PgStore {
    db: DatabaseConnection,
}

impl PgStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn profile_from_model(model: &devices::Model) -> Option<DeviceProfile> {
    let Some(tipo) = DeviceKind::parse(&model.tipo) else {
        tracing::warn!(device_id = %model.id, tipo = %model.tipo, "Unknown device type, skipping");
        return None;
    };
    Some(DeviceProfile {
        id: model.id,
        nombre: model.nombre.clone(),
        tipo,
        radio_cobertura_m: model.radio_cobertura_m,
        flujo: FlowConfig {
            caudal_l_min: model.caudal_l_min,
            tiempo_vuelta_completa_min: model.tiempo_vuelta_completa_min,
        },
        activo: model.activo,
    })
}

fn sector_from_model(model: sectors::Model) -> SectorSpec {
    SectorSpec {
        id: model.id,
        numero: model.numero,
        angulo_inicio: model.angulo_inicio,
        angulo_fin: model.angulo_fin,
        radio_interno_m: model.radio_interno_m,
        radio_externo_m: model.radio_externo_m,
        coeficiente_riego: model.coeficiente_riego,
        prioridad: model.prioridad,
        activo: model.activo,
    }
}

fn vuelta_from_model(model: vueltas::Model) -> Vuelta {
    Vuelta {
        id: model.id,
        device_id: model.device_id,
        numero_vuelta: model.numero_vuelta,
        angulo_inicio: model.angulo_inicio,
        fecha_inicio: model.fecha_inicio.with_timezone(&Utc),
        fecha_fin: model.fecha_fin.map(|t| t.with_timezone(&Utc)),
        completada: model.completada,
        cierre: model.cierre.as_deref().and_then(CloseReason::parse),
        sectores_pasados: u32::try_from(model.sectores_pasados).unwrap_or(0),
        sectores_completados: u32::try_from(model.sectores_completados).unwrap_or(0),
        agua_total_litros: model.agua_total_litros,
        area_total_ha: model.area_total_ha,
        lamina_promedio_mm: model.lamina_promedio_mm,
        presion_promedio_vuelta: model.presion_promedio_vuelta,
        duracion_total_minutos: model.duracion_total_minutos,
        porcentaje_completado: model.porcentaje_completado,
        anomalias_rotacion: u32::try_from(model.anomalias_rotacion).unwrap_or(0),
    }
}

fn vuelta_to_active(vuelta: &Vuelta) -> vueltas::ActiveModel {
    let count = |n: u32| i32::try_from(n).unwrap_or(i32::MAX);
    vueltas::ActiveModel {
        id: Set(vuelta.id),
        device_id: Set(vuelta.device_id),
        numero_vuelta: Set(vuelta.numero_vuelta),
        angulo_inicio: Set(vuelta.angulo_inicio),
        fecha_inicio: Set(vuelta.fecha_inicio.into()),
        fecha_fin: Set(vuelta.fecha_fin.map(Into::into)),
        completada: Set(vuelta.completada),
        cierre: Set(vuelta.cierre.map(|c| c.as_str().to_string())),
        sectores_pasados: Set(count(vuelta.sectores_pasados)),
        sectores_completados: Set(count(vuelta.sectores_completados)),
        agua_total_litros: Set(vuelta.agua_total_litros),
        area_total_ha: Set(vuelta.area_total_ha),
        lamina_promedio_mm: Set(vuelta.lamina_promedio_mm),
        presion_promedio_vuelta: Set(vuelta.presion_promedio_vuelta),
        duracion_total_minutos: Set(vuelta.duracion_total_minutos),
        porcentaje_completado: Set(vuelta.porcentaje_completado),
        anomalias_rotacion: Set(count(vuelta.anomalias_rotacion)),
    }
}

fn stats_from_model(model: &device_stats::Model) -> StatsAggregator {
    StatsAggregator {
        total_vueltas: u64::try_from(model.total_vueltas).unwrap_or(0),
        vueltas_completadas: u64::try_from(model.vueltas_completadas).unwrap_or(0),
        suma_lamina_mm: model.suma_lamina_mm,
        agua_total_litros: model.agua_total_litros,
        area_total_ha: model.area_total_ha,
        tiempo_total_minutos: model.tiempo_total_minutos,
    }
}

async fn upsert_vuelta<C: ConnectionTrait>(db: &C, vuelta: &Vuelta) -> Result<(), DbErr> {
    vueltas::Entity::insert(vuelta_to_active(vuelta))
        .on_conflict(
            OnConflict::column(vueltas::Column::Id)
                .update_columns([
                    vueltas::Column::FechaFin,
                    vueltas::Column::Completada,
                    vueltas::Column::Cierre,
                    vueltas::Column::SectoresPasados,
                    vueltas::Column::SectoresCompletados,
                    vueltas::Column::AguaTotalLitros,
                    vueltas::Column::AreaTotalHa,
                    vueltas::Column::LaminaPromedioMm,
                    vueltas::Column::PresionPromedioVuelta,
                    vueltas::Column::DuracionTotalMinutos,
                    vueltas::Column::PorcentajeCompletado,
                    vueltas::Column::AnomaliasRotacion,
                ])
                .to_owned(),
        )
        .exec(db)
        .await?;
    Ok(())
}

#[async_trait]
impl IrrigationStore for PgStore {
    async fn load_devices(&self) -> Result<Vec<StoredDevice>, DbErr> {
        let devices = devices::Entity::find().all(&self.db).await?;

        let mut pivots: HashMap<(Uuid, Uuid), PivotCenter> = HashMap::new();
        for p in pivot_centers::Entity::find().all(&self.db).await? {
            pivots.insert(
                (p.device_id, p.lote_id),
                PivotCenter {
                    lote_id: p.lote_id,
                    latitud: p.latitud,
                    longitud: p.longitud,
                    radio_cobertura_m: p.radio_cobertura_m,
                },
            );
        }

        let mut sectors_by_lot: HashMap<(Uuid, Uuid), Vec<SectorSpec>> = HashMap::new();
        for s in sectors::Entity::find()
            .order_by_asc(sectors::Column::Numero)
            .all(&self.db)
            .await?
        {
            sectors_by_lot
                .entry((s.device_id, s.lote_id))
                .or_default()
                .push(sector_from_model(s));
        }

        let mut checkpoints: HashMap<Uuid, TrackerCheckpoint> = HashMap::new();
        for live in device_live_state::Entity::find().all(&self.db).await? {
            match serde_json::from_value(live.checkpoint) {
                Ok(cp) => {
                    checkpoints.insert(live.device_id, cp);
                }
                Err(e) => tracing::warn!(
                    device_id = %live.device_id,
                    error = %e,
                    "Unreadable tracker checkpoint, starting fresh"
                ),
            }
        }

        let stats: HashMap<Uuid, StatsAggregator> = device_stats::Entity::find()
            .all(&self.db)
            .await?
            .iter()
            .map(|m| (m.device_id, stats_from_model(m)))
            .collect();

        let last_numbers: HashMap<Uuid, i32> = vueltas::Entity::find()
            .select_only()
            .column(vueltas::Column::DeviceId)
            .column_as(Expr::col(vueltas::Column::NumeroVuelta).max(), "max_numero")
            .group_by(vueltas::Column::DeviceId)
            .into_tuple::<(Uuid, Option<i32>)>()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|(id, max)| (id, max.unwrap_or(0)))
            .collect();

        let stored = devices
            .iter()
            .filter_map(|model| {
                let profile = profile_from_model(model)?;
                let lot = model.lote_activo;
                Some(StoredDevice {
                    lote_activo: lot,
                    pivot: lot.and_then(|l| pivots.remove(&(model.id, l))),
                    sectors: lot
                        .and_then(|l| sectors_by_lot.remove(&(model.id, l)))
                        .unwrap_or_default(),
                    checkpoint: checkpoints.remove(&model.id),
                    ultimo_numero: last_numbers.get(&model.id).copied().unwrap_or(0),
                    history: stats.get(&model.id).cloned().unwrap_or_default(),
                    profile,
                })
            })
            .collect();
        Ok(stored)
    }

    async fn save_device(&self, profile: &DeviceProfile) -> Result<(), DbErr> {
        let now = Utc::now();
        let model = devices::ActiveModel {
            id: Set(profile.id),
            nombre: Set(profile.nombre.clone()),
            tipo: Set(profile.tipo.as_str().to_string()),
            radio_cobertura_m: Set(profile.radio_cobertura_m),
            caudal_l_min: Set(profile.flujo.caudal_l_min),
            tiempo_vuelta_completa_min: Set(profile.flujo.tiempo_vuelta_completa_min),
            activo: Set(profile.activo),
            lote_activo: sea_orm::ActiveValue::NotSet,
            created_at: Set(Some(now.into())),
            updated_at: Set(Some(now.into())),
        };

        devices::Entity::insert(model)
            .on_conflict(
                OnConflict::column(devices::Column::Id)
                    .update_columns([
                        devices::Column::Nombre,
                        devices::Column::Tipo,
                        devices::Column::RadioCoberturaM,
                        devices::Column::CaudalLMin,
                        devices::Column::TiempoVueltaCompletaMin,
                        devices::Column::Activo,
                        devices::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn replace_sectors(
        &self,
        device_id: Uuid,
        pivot: &PivotCenter,
        specs: &[SectorSpec],
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        pivot_centers::Entity::insert(pivot_centers::ActiveModel {
            device_id: Set(device_id),
            lote_id: Set(pivot.lote_id),
            latitud: Set(pivot.latitud),
            longitud: Set(pivot.longitud),
            radio_cobertura_m: Set(pivot.radio_cobertura_m),
            updated_at: Set(Some(now.into())),
        })
        .on_conflict(
            OnConflict::columns([pivot_centers::Column::DeviceId, pivot_centers::Column::LoteId])
                .update_columns([
                    pivot_centers::Column::Latitud,
                    pivot_centers::Column::Longitud,
                    pivot_centers::Column::RadioCoberturaM,
                    pivot_centers::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(&txn)
        .await?;

        sectors::Entity::delete_many()
            .filter(sectors::Column::DeviceId.eq(device_id))
            .filter(sectors::Column::LoteId.eq(pivot.lote_id))
            .exec(&txn)
            .await?;

        if !specs.is_empty() {
            let models = specs.iter().map(|s| sectors::ActiveModel {
                id: Set(s.id),
                device_id: Set(device_id),
                lote_id: Set(pivot.lote_id),
                numero: Set(s.numero),
                angulo_inicio: Set(s.angulo_inicio),
                angulo_fin: Set(s.angulo_fin),
                radio_interno_m: Set(s.radio_interno_m),
                radio_externo_m: Set(s.radio_externo_m),
                coeficiente_riego: Set(s.coeficiente_riego),
                prioridad: Set(s.prioridad),
                activo: Set(s.activo),
                updated_at: Set(Some(now.into())),
            });
            sectors::Entity::insert_many(models).exec(&txn).await?;
        }

        devices::Entity::update_many()
            .col_expr(devices::Column::LoteActivo, Expr::value(pivot.lote_id))
            .col_expr(devices::Column::UpdatedAt, Expr::value(now))
            .filter(devices::Column::Id.eq(device_id))
            .exec(&txn)
            .await?;

        txn.commit().await
    }

    async fn set_sector_active(
        &self,
        device_id: Uuid,
        sector_id: SectorId,
        activo: bool,
    ) -> Result<(), DbErr> {
        let result = sectors::Entity::update_many()
            .col_expr(sectors::Column::Activo, Expr::value(activo))
            .col_expr(sectors::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(sectors::Column::Id.eq(sector_id))
            .filter(sectors::Column::DeviceId.eq(device_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(DbErr::RecordNotFound(format!("sector {sector_id}")));
        }
        Ok(())
    }

    async fn commit(&self, commit: &DeviceCommit) -> Result<(), DbErr> {
        let now = Utc::now();
        let checkpoint =
            serde_json::to_value(&commit.checkpoint).map_err(|e| DbErr::Custom(e.to_string()))?;
        let txn = self.db.begin().await?;

        if let Some(sample) = &commit.sample
            && let Some(angle) = sample.angle
        {
            let inserted = position_samples::Entity::insert(position_samples::ActiveModel {
                device_id: Set(sample.device_id),
                time: Set(sample.timestamp.into()),
                angle: Set(angle),
                pressure_psi: Set(sample.pressure_psi),
                altitude_m: Set(sample.altitude_m),
                speed_kmh: Set(sample.speed_kmh),
            })
            .on_conflict(
                OnConflict::columns([
                    position_samples::Column::DeviceId,
                    position_samples::Column::Time,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&txn)
            .await;
            // A replayed sample is already stored
            match inserted {
                Ok(_) | Err(DbErr::RecordNotInserted) => {}
                Err(e) => return Err(e),
            }
        }

        for vuelta in &commit.vueltas {
            upsert_vuelta(&txn, vuelta).await?;
        }

        let live = &commit.live;
        device_live_state::Entity::insert(device_live_state::ActiveModel {
            device_id: Set(commit.device_id),
            sector_actual: Set(live.sector_actual),
            estado: Set(live.estado.as_str().to_string()),
            angulo_actual: Set(live.angulo_actual),
            ultima_actividad: Set(live.ultima_actividad.map(Into::into)),
            checkpoint: Set(checkpoint),
            updated_at: Set(Some(now.into())),
        })
        .on_conflict(
            OnConflict::column(device_live_state::Column::DeviceId)
                .update_columns([
                    device_live_state::Column::SectorActual,
                    device_live_state::Column::Estado,
                    device_live_state::Column::AnguloActual,
                    device_live_state::Column::UltimaActividad,
                    device_live_state::Column::Checkpoint,
                    device_live_state::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(&txn)
        .await?;

        let stats = &commit.stats;
        device_stats::Entity::insert(device_stats::ActiveModel {
            device_id: Set(commit.device_id),
            total_vueltas: Set(i64::try_from(stats.total_vueltas).unwrap_or(i64::MAX)),
            vueltas_completadas: Set(i64::try_from(stats.vueltas_completadas).unwrap_or(i64::MAX)),
            suma_lamina_mm: Set(stats.suma_lamina_mm),
            agua_total_litros: Set(stats.agua_total_litros),
            area_total_ha: Set(stats.area_total_ha),
            tiempo_total_minutos: Set(stats.tiempo_total_minutos),
            updated_at: Set(Some(now.into())),
        })
        .on_conflict(
            OnConflict::column(device_stats::Column::DeviceId)
                .update_columns([
                    device_stats::Column::TotalVueltas,
                    device_stats::Column::VueltasCompletadas,
                    device_stats::Column::SumaLaminaMm,
                    device_stats::Column::AguaTotalLitros,
                    device_stats::Column::AreaTotalHa,
                    device_stats::Column::TiempoTotalMinutos,
                    device_stats::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(&txn)
        .await?;

        txn.commit().await
    }

    async fn list_vueltas(
        &self,
        device_id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<Vuelta>, DbErr> {
        let models = vueltas::Entity::find()
            .filter(vueltas::Column::DeviceId.eq(device_id))
            .filter(vueltas::Column::FechaFin.is_not_null())
            .order_by_desc(vueltas::Column::NumeroVuelta)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(vuelta_from_model).collect())
    }
}
