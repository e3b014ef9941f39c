use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== DEVICES ==========
        manager
            .create_table(
                Table::create()
                    .table(Devices::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Devices::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Devices::Nombre).string_len(128).not_null())
                    .col(ColumnDef::new(Devices::Tipo).string_len(16).not_null())
                    .col(ColumnDef::new(Devices::RadioCoberturaM).double().not_null())
                    .col(ColumnDef::new(Devices::CaudalLMin).double())
                    .col(ColumnDef::new(Devices::TiempoVueltaCompletaMin).double())
                    .col(ColumnDef::new(Devices::Activo).boolean().not_null().default(true))
                    .col(ColumnDef::new(Devices::LoteActivo).uuid())
                    .col(
                        ColumnDef::new(Devices::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(ColumnDef::new(Devices::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // ========== PIVOT CENTERS ==========
        manager
            .create_table(
                Table::create()
                    .table(PivotCenters::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PivotCenters::DeviceId).uuid().not_null())
                    .col(ColumnDef::new(PivotCenters::LoteId).uuid().not_null())
                    .col(ColumnDef::new(PivotCenters::Latitud).double().not_null())
                    .col(ColumnDef::new(PivotCenters::Longitud).double().not_null())
                    .col(
                        ColumnDef::new(PivotCenters::RadioCoberturaM)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PivotCenters::UpdatedAt).timestamp_with_time_zone())
                    .primary_key(
                        Index::create()
                            .col(PivotCenters::DeviceId)
                            .col(PivotCenters::LoteId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pivot_centers_device")
                            .from(PivotCenters::Table, PivotCenters::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== SECTORS ==========
        manager
            .create_table(
                Table::create()
                    .table(Sectors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sectors::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Sectors::DeviceId).uuid().not_null())
                    .col(ColumnDef::new(Sectors::LoteId).uuid().not_null())
                    .col(ColumnDef::new(Sectors::Numero).integer().not_null())
                    .col(ColumnDef::new(Sectors::AnguloInicio).double().not_null())
                    .col(ColumnDef::new(Sectors::AnguloFin).double().not_null())
                    .col(ColumnDef::new(Sectors::RadioInternoM).double().not_null())
                    .col(ColumnDef::new(Sectors::RadioExternoM).double().not_null())
                    .col(
                        ColumnDef::new(Sectors::CoeficienteRiego)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(ColumnDef::new(Sectors::Prioridad).integer().not_null().default(0))
                    .col(ColumnDef::new(Sectors::Activo).boolean().not_null().default(true))
                    .col(ColumnDef::new(Sectors::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sectors_device")
                            .from(Sectors::Table, Sectors::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sectors_device_lote")
                    .table(Sectors::Table)
                    .col(Sectors::DeviceId)
                    .col(Sectors::LoteId)
                    .to_owned(),
            )
            .await?;

        // ========== VUELTAS ==========
        manager
            .create_table(
                Table::create()
                    .table(Vueltas::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vueltas::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Vueltas::DeviceId).uuid().not_null())
                    .col(ColumnDef::new(Vueltas::NumeroVuelta).integer().not_null())
                    .col(ColumnDef::new(Vueltas::AnguloInicio).double().not_null())
                    .col(
                        ColumnDef::new(Vueltas::FechaInicio)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Vueltas::FechaFin).timestamp_with_time_zone())
                    .col(ColumnDef::new(Vueltas::Completada).boolean().not_null())
                    .col(ColumnDef::new(Vueltas::Cierre).string_len(16))
                    .col(ColumnDef::new(Vueltas::SectoresPasados).integer().not_null())
                    .col(
                        ColumnDef::new(Vueltas::SectoresCompletados)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Vueltas::AguaTotalLitros).double().not_null())
                    .col(ColumnDef::new(Vueltas::AreaTotalHa).double().not_null())
                    .col(ColumnDef::new(Vueltas::LaminaPromedioMm).double().not_null())
                    .col(ColumnDef::new(Vueltas::PresionPromedioVuelta).double())
                    .col(
                        ColumnDef::new(Vueltas::DuracionTotalMinutos)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vueltas::PorcentajeCompletado)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vueltas::AnomaliasRotacion)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vueltas_device")
                            .from(Vueltas::Table, Vueltas::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vueltas_device_numero")
                    .table(Vueltas::Table)
                    .col(Vueltas::DeviceId)
                    .col(Vueltas::NumeroVuelta)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========== DEVICE LIVE STATE ==========
        manager
            .create_table(
                Table::create()
                    .table(DeviceLiveState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceLiveState::DeviceId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeviceLiveState::SectorActual).uuid())
                    .col(
                        ColumnDef::new(DeviceLiveState::Estado)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceLiveState::AnguloActual).double())
                    .col(ColumnDef::new(DeviceLiveState::UltimaActividad).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeviceLiveState::Checkpoint).json_binary().not_null())
                    .col(ColumnDef::new(DeviceLiveState::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_device_live_state_device")
                            .from(DeviceLiveState::Table, DeviceLiveState::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== POSITION SAMPLES ==========
        manager
            .create_table(
                Table::create()
                    .table(PositionSamples::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PositionSamples::DeviceId).uuid().not_null())
                    .col(
                        ColumnDef::new(PositionSamples::Time)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PositionSamples::Angle).double().not_null())
                    .col(ColumnDef::new(PositionSamples::PressurePsi).double())
                    .col(ColumnDef::new(PositionSamples::AltitudeM).double())
                    .col(ColumnDef::new(PositionSamples::SpeedKmh).double())
                    .primary_key(
                        Index::create()
                            .col(PositionSamples::DeviceId)
                            .col(PositionSamples::Time),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_position_samples_device")
                            .from(PositionSamples::Table, PositionSamples::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Hypertable only where TimescaleDB is installed
        let db = manager.get_connection();
        db.execute_unprepared(
            "DO $$ BEGIN \
               IF EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'timescaledb') THEN \
                 PERFORM create_hypertable('position_samples', 'time', \
                   chunk_time_interval => INTERVAL '7 days'); \
               END IF; \
             END $$",
        )
        .await?;

        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_position_samples_device_time \
             ON position_samples (device_id, time DESC)",
        )
        .await?;

        // ========== DEVICE STATS ==========
        manager
            .create_table(
                Table::create()
                    .table(DeviceStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceStats::DeviceId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeviceStats::TotalVueltas).big_integer().not_null())
                    .col(
                        ColumnDef::new(DeviceStats::VueltasCompletadas)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceStats::SumaLaminaMm).double().not_null())
                    .col(ColumnDef::new(DeviceStats::AguaTotalLitros).double().not_null())
                    .col(ColumnDef::new(DeviceStats::AreaTotalHa).double().not_null())
                    .col(
                        ColumnDef::new(DeviceStats::TiempoTotalMinutos)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeviceStats::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_device_stats_device")
                            .from(DeviceStats::Table, DeviceStats::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order of dependencies
        manager
            .drop_table(Table::drop().table(DeviceStats::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(PositionSamples::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(DeviceLiveState::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Vueltas::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sectors::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(PivotCenters::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Devices::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Devices {
    Table,
    Id,
    Nombre,
    Tipo,
    RadioCoberturaM,
    CaudalLMin,
    TiempoVueltaCompletaMin,
    Activo,
    LoteActivo,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum PivotCenters {
    Table,
    DeviceId,
    LoteId,
    Latitud,
    Longitud,
    RadioCoberturaM,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Sectors {
    Table,
    Id,
    DeviceId,
    LoteId,
    Numero,
    AnguloInicio,
    AnguloFin,
    RadioInternoM,
    RadioExternoM,
    CoeficienteRiego,
    Prioridad,
    Activo,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum Vueltas {
    Table,
    Id,
    DeviceId,
    NumeroVuelta,
    AnguloInicio,
    FechaInicio,
    FechaFin,
    Completada,
    Cierre,
    SectoresPasados,
    SectoresCompletados,
    AguaTotalLitros,
    AreaTotalHa,
    LaminaPromedioMm,
    PresionPromedioVuelta,
    DuracionTotalMinutos,
    PorcentajeCompletado,
    AnomaliasRotacion,
}

#[derive(DeriveIden)]
pub enum DeviceLiveState {
    Table,
    DeviceId,
    SectorActual,
    Estado,
    AnguloActual,
    UltimaActividad,
    Checkpoint,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum PositionSamples {
    Table,
    DeviceId,
    Time,
    Angle,
    PressurePsi,
    AltitudeM,
    SpeedKmh,
}

#[derive(DeriveIden)]
pub enum DeviceStats {
    Table,
    DeviceId,
    TotalVueltas,
    VueltasCompletadas,
    SumaLaminaMm,
    AguaTotalLitros,
    AreaTotalHa,
    TiempoTotalMinutos,
    UpdatedAt,
}
