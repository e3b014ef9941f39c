use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "devices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub nombre: String,
    pub tipo: String,
    pub radio_cobertura_m: f64,
    pub caudal_l_min: Option<f64>,
    pub tiempo_vuelta_completa_min: Option<f64>,
    pub activo: bool,
    pub lote_activo: Option<Uuid>,
    pub created_at: Option<DateTimeWithTimeZone>,
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sectors::Entity")]
    Sectors,
    #[sea_orm(has_many = "super::vueltas::Entity")]
    Vueltas,
    #[sea_orm(has_one = "super::device_live_state::Entity")]
    LiveState,
}

impl Related<super::sectors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sectors.def()
    }
}

impl Related<super::vueltas::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vueltas.def()
    }
}

impl Related<super::device_live_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LiveState.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
