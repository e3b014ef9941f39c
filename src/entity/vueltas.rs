use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vueltas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub device_id: Uuid,
    pub numero_vuelta: i32,
    pub angulo_inicio: f64,
    pub fecha_inicio: DateTimeWithTimeZone,
    pub fecha_fin: Option<DateTimeWithTimeZone>,
    pub completada: bool,
    pub cierre: Option<String>,
    pub sectores_pasados: i32,
    pub sectores_completados: i32,
    pub agua_total_litros: f64,
    pub area_total_ha: f64,
    pub lamina_promedio_mm: f64,
    pub presion_promedio_vuelta: Option<f64>,
    pub duracion_total_minutos: f64,
    pub porcentaje_completado: f64,
    pub anomalias_rotacion: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::devices::Entity",
        from = "Column::DeviceId",
        to = "super::devices::Column::Id"
    )]
    Device,
}

impl Related<super::devices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
