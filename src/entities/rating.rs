use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Post-completion evaluation of one project party by the other.
///
/// Clients score `output_quality`, `execution_efficiency` and `compliance`;
/// contractors score `requirement_clarity` and `communication`. Each set
/// dimension lies in 1.0..=5.0.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ratings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Uuid,
    pub rater_id: Uuid,
    pub rated_user_id: Uuid,
    pub output_quality: Option<f64>,
    pub execution_efficiency: Option<f64>,
    pub compliance: Option<f64>,
    pub requirement_clarity: Option<f64>,
    pub communication: Option<f64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub comment: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Every dimension that was filled in, in column order.
    pub fn scores(&self) -> Vec<f64> {
        [
            self.output_quality,
            self.execution_efficiency,
            self.compliance,
            self.requirement_clarity,
            self.communication,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Mean of the set dimensions, `None` when nothing was scored.
    pub fn mean_score(&self) -> Option<f64> {
        let scores = self.scores();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id",
        on_delete = "Cascade"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
