use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Record::Table)
                    .if_not_exists()
                    .col(string_len(Record::Collection, 64).not_null())
                    .col(string_len(Record::Id, 64).not_null())
                    .col(big_integer(Record::Version).not_null())
                    .col(json_binary(Record::Body).not_null())
                    .col(
                        timestamp_with_time_zone(Record::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_record")
                            .col(Record::Collection)
                            .col(Record::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Backs the bookedBy membership filter on rides
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE INDEX IF NOT EXISTS idx_record_booked_by ON record USING GIN ((body -> 'bookedBy'))",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Record::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Record {
    Table,
    Collection,
    Id,
    Version,
    Body,
    UpdatedAt,
}
