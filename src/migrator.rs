use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_users_table::Migration),
            Box::new(m20240601_000002_create_projects_table::Migration),
            Box::new(m20240601_000003_create_proposal_tables::Migration),
            Box::new(m20240601_000004_create_submission_versions_table::Migration),
            Box::new(m20240601_000005_create_issue_tables::Migration),
            Box::new(m20240601_000006_create_messages_table::Migration),
            Box::new(m20240601_000007_create_ratings_table::Migration),
        ]
    }
}

mod m20240601_000001_create_users_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_users_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Users::Username)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Users::Email)
                                .string_len(255)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Users {
        Table,
        Id,
        Username,
        Email,
        PasswordHash,
        Role,
        CreatedAt,
    }
}

mod m20240601_000002_create_projects_table {
    use super::m20240601_000001_create_users_table::Users;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_projects_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Projects::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Projects::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Projects::Title).string_len(255).not_null())
                        .col(ColumnDef::new(Projects::Description).text().not_null())
                        .col(ColumnDef::new(Projects::Budget).decimal_len(14, 2).null())
                        .col(ColumnDef::new(Projects::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Projects::ClientId).uuid().not_null())
                        .col(ColumnDef::new(Projects::ContractorId).uuid().null())
                        .col(
                            ColumnDef::new(Projects::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Projects::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Projects::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Projects::RejectionReason).text().null())
                        .col(ColumnDef::new(Projects::SubmissionFileUrl).string().null())
                        .col(
                            ColumnDef::new(Projects::Deadline)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_projects_client_id")
                                .from(Projects::Table, Projects::ClientId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_projects_contractor_id")
                                .from(Projects::Table, Projects::ContractorId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_projects_status")
                        .table(Projects::Table)
                        .col(Projects::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_projects_client_id")
                        .table(Projects::Table)
                        .col(Projects::ClientId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_projects_contractor_id")
                        .table(Projects::Table)
                        .col(Projects::ContractorId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Projects::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(crate) enum Projects {
        Table,
        Id,
        Title,
        Description,
        Budget,
        Status,
        ClientId,
        ContractorId,
        CreatedAt,
        UpdatedAt,
        CompletedAt,
        RejectionReason,
        SubmissionFileUrl,
        Deadline,
    }
}

mod m20240601_000003_create_proposal_tables {
    use super::m20240601_000001_create_users_table::Users;
    use super::m20240601_000002_create_projects_table::Projects;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_proposal_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Proposals::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Proposals::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Proposals::ProjectId).uuid().not_null())
                        .col(ColumnDef::new(Proposals::ContractorId).uuid().not_null())
                        .col(ColumnDef::new(Proposals::Price).decimal_len(14, 2).not_null())
                        .col(ColumnDef::new(Proposals::Description).text().null())
                        .col(
                            ColumnDef::new(Proposals::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_proposals_project_id")
                                .from(Proposals::Table, Proposals::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_proposals_contractor_id")
                                .from(Proposals::Table, Proposals::ContractorId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_proposals_project_id")
                        .table(Proposals::Table)
                        .col(Proposals::ProjectId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProposalFiles::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProposalFiles::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProposalFiles::ProposalId).uuid().not_null())
                        .col(ColumnDef::new(ProposalFiles::Version).integer().not_null())
                        .col(
                            ColumnDef::new(ProposalFiles::OriginalFilename)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProposalFiles::StoredPath).string().not_null())
                        .col(
                            ColumnDef::new(ProposalFiles::UploadedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_proposal_files_proposal_id")
                                .from(ProposalFiles::Table, ProposalFiles::ProposalId)
                                .to(Proposals::Table, Proposals::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_proposal_files_proposal_version")
                        .table(ProposalFiles::Table)
                        .col(ProposalFiles::ProposalId)
                        .col(ProposalFiles::Version)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProposalFiles::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Proposals::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Proposals {
        Table,
        Id,
        ProjectId,
        ContractorId,
        Price,
        Description,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProposalFiles {
        Table,
        Id,
        ProposalId,
        Version,
        OriginalFilename,
        StoredPath,
        UploadedAt,
    }
}

mod m20240601_000004_create_submission_versions_table {
    use super::m20240601_000002_create_projects_table::Projects;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_submission_versions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SubmissionVersions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SubmissionVersions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SubmissionVersions::ProjectId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SubmissionVersions::Version)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SubmissionVersions::SubmitUrl)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SubmissionVersions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_submission_versions_project_id")
                                .from(SubmissionVersions::Table, SubmissionVersions::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_submission_versions_project_version")
                        .table(SubmissionVersions::Table)
                        .col(SubmissionVersions::ProjectId)
                        .col(SubmissionVersions::Version)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SubmissionVersions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SubmissionVersions {
        Table,
        Id,
        ProjectId,
        Version,
        SubmitUrl,
        CreatedAt,
    }
}

mod m20240601_000005_create_issue_tables {
    use super::m20240601_000001_create_users_table::Users;
    use super::m20240601_000002_create_projects_table::Projects;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_issue_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Issues::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Issues::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Issues::ProjectId).uuid().not_null())
                        .col(ColumnDef::new(Issues::Title).string_len(255).not_null())
                        .col(ColumnDef::new(Issues::Description).text().not_null())
                        .col(ColumnDef::new(Issues::Status).string_len(16).not_null())
                        .col(ColumnDef::new(Issues::CreatedById).uuid().not_null())
                        .col(
                            ColumnDef::new(Issues::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Issues::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_issues_project_id")
                                .from(Issues::Table, Issues::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_issues_created_by_id")
                                .from(Issues::Table, Issues::CreatedById)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_issues_project_status")
                        .table(Issues::Table)
                        .col(Issues::ProjectId)
                        .col(Issues::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(IssueComments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IssueComments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(IssueComments::IssueId).uuid().not_null())
                        .col(ColumnDef::new(IssueComments::SenderId).uuid().not_null())
                        .col(ColumnDef::new(IssueComments::Content).text().not_null())
                        .col(
                            ColumnDef::new(IssueComments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_issue_comments_issue_id")
                                .from(IssueComments::Table, IssueComments::IssueId)
                                .to(Issues::Table, Issues::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_issue_comments_sender_id")
                                .from(IssueComments::Table, IssueComments::SenderId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IssueComments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Issues::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Issues {
        Table,
        Id,
        ProjectId,
        Title,
        Description,
        Status,
        CreatedById,
        CreatedAt,
        ResolvedAt,
    }

    #[derive(DeriveIden)]
    enum IssueComments {
        Table,
        Id,
        IssueId,
        SenderId,
        Content,
        CreatedAt,
    }
}

mod m20240601_000006_create_messages_table {
    use super::m20240601_000001_create_users_table::Users;
    use super::m20240601_000002_create_projects_table::Projects;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_create_messages_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Messages::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Messages::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Messages::ProjectId).uuid().not_null())
                        .col(ColumnDef::new(Messages::SenderId).uuid().not_null())
                        .col(ColumnDef::new(Messages::Content).text().not_null())
                        .col(
                            ColumnDef::new(Messages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_messages_project_id")
                                .from(Messages::Table, Messages::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_messages_sender_id")
                                .from(Messages::Table, Messages::SenderId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_messages_project_created_at")
                        .table(Messages::Table)
                        .col(Messages::ProjectId)
                        .col(Messages::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Messages::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Messages {
        Table,
        Id,
        ProjectId,
        SenderId,
        Content,
        CreatedAt,
    }
}

mod m20240601_000007_create_ratings_table {
    use super::m20240601_000001_create_users_table::Users;
    use super::m20240601_000002_create_projects_table::Projects;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000007_create_ratings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Ratings::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Ratings::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Ratings::ProjectId).uuid().not_null())
                        .col(ColumnDef::new(Ratings::RaterId).uuid().not_null())
                        .col(ColumnDef::new(Ratings::RatedUserId).uuid().not_null())
                        .col(ColumnDef::new(Ratings::OutputQuality).double().null())
                        .col(ColumnDef::new(Ratings::ExecutionEfficiency).double().null())
                        .col(ColumnDef::new(Ratings::Compliance).double().null())
                        .col(ColumnDef::new(Ratings::RequirementClarity).double().null())
                        .col(ColumnDef::new(Ratings::Communication).double().null())
                        .col(ColumnDef::new(Ratings::Comment).text().null())
                        .col(
                            ColumnDef::new(Ratings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Ratings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ratings_project_id")
                                .from(Ratings::Table, Ratings::ProjectId)
                                .to(Projects::Table, Projects::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ratings_rater_id")
                                .from(Ratings::Table, Ratings::RaterId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_ratings_rated_user_id")
                                .from(Ratings::Table, Ratings::RatedUserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_ratings_project_rater_rated")
                        .table(Ratings::Table)
                        .col(Ratings::ProjectId)
                        .col(Ratings::RaterId)
                        .col(Ratings::RatedUserId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ratings_rated_user_id")
                        .table(Ratings::Table)
                        .col(Ratings::RatedUserId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Ratings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Ratings {
        Table,
        Id,
        ProjectId,
        RaterId,
        RatedUserId,
        OutputQuality,
        ExecutionEfficiency,
        Compliance,
        RequirementClarity,
        Communication,
        Comment,
        CreatedAt,
        UpdatedAt,
    }
}

/// Standalone migration runner used by the `migrate` subcommand
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(2)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
