use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{project, rating, ProjectStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::users::map_unique_violation,
};

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 5.0;

/// Who is rating whom on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingDirection {
    ClientToContractor,
    ContractorToClient,
}

impl RatingDirection {
    /// Direction for `rater_id` on `project`, `None` for outsiders.
    pub fn for_rater(project: &project::Model, rater_id: Uuid) -> Option<Self> {
        if project.client_id == rater_id {
            Some(Self::ClientToContractor)
        } else if project.contractor_id == Some(rater_id) {
            Some(Self::ContractorToClient)
        } else {
            None
        }
    }

    /// The only user a rater in this direction may rate.
    pub fn counterpart(self, project: &project::Model) -> Option<Uuid> {
        match self {
            Self::ClientToContractor => project.contractor_id,
            Self::ContractorToClient => Some(project.client_id),
        }
    }
}

/// Dimension scores; which ones may be set depends on the direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingScores {
    pub output_quality: Option<f64>,
    pub execution_efficiency: Option<f64>,
    pub compliance: Option<f64>,
    pub requirement_clarity: Option<f64>,
    pub communication: Option<f64>,
}

impl RatingScores {
    fn own_and_foreign(&self, direction: RatingDirection) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
        let client_side = vec![
            self.output_quality,
            self.execution_efficiency,
            self.compliance,
        ];
        let contractor_side = vec![self.requirement_clarity, self.communication];
        match direction {
            RatingDirection::ClientToContractor => (client_side, contractor_side),
            RatingDirection::ContractorToClient => (contractor_side, client_side),
        }
    }

    /// Only the direction's dimensions, at least one of them, each in range.
    pub fn validate_for(&self, direction: RatingDirection) -> Result<(), ServiceError> {
        let (own, foreign) = self.own_and_foreign(direction);

        if foreign.iter().any(Option::is_some) {
            let allowed = match direction {
                RatingDirection::ClientToContractor => {
                    "output_quality, execution_efficiency, compliance"
                }
                RatingDirection::ContractorToClient => "requirement_clarity, communication",
            };
            return Err(ServiceError::ValidationError(format!(
                "This rating may only score: {}",
                allowed
            )));
        }

        let set: Vec<f64> = own.into_iter().flatten().collect();
        if set.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one rating dimension is required".into(),
            ));
        }
        if let Some(bad) = set
            .iter()
            .find(|v| !v.is_finite() || **v < MIN_SCORE || **v > MAX_SCORE)
        {
            return Err(ServiceError::ValidationError(format!(
                "Score {} is outside {:.1}-{:.1}",
                bad, MIN_SCORE, MAX_SCORE
            )));
        }
        Ok(())
    }

    /// `patch` values win where present.
    fn merged_with(&self, patch: &RatingScores) -> RatingScores {
        RatingScores {
            output_quality: patch.output_quality.or(self.output_quality),
            execution_efficiency: patch.execution_efficiency.or(self.execution_efficiency),
            compliance: patch.compliance.or(self.compliance),
            requirement_clarity: patch.requirement_clarity.or(self.requirement_clarity),
            communication: patch.communication.or(self.communication),
        }
    }
}

impl From<&rating::Model> for RatingScores {
    fn from(m: &rating::Model) -> Self {
        Self {
            output_quality: m.output_quality,
            execution_efficiency: m.execution_efficiency,
            compliance: m.compliance,
            requirement_clarity: m.requirement_clarity,
            communication: m.communication,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRating {
    pub rated_user_id: Uuid,
    #[serde(flatten)]
    pub scores: RatingScores,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingPatch {
    pub rated_user_id: Uuid,
    #[serde(flatten)]
    pub scores: RatingScores,
    pub comment: Option<String>,
}

/// Aggregate of ratings a user received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub user_id: Uuid,
    pub average: f64,
    pub count: u64,
}

/// Mean of per-rating means, one decimal; 0.0 when nothing counts.
pub fn average_of(ratings: &[rating::Model]) -> (f64, u64) {
    let means: Vec<f64> = ratings.iter().filter_map(rating::Model::mean_score).collect();
    if means.is_empty() {
        return (0.0, 0);
    }
    let mean = means.iter().sum::<f64>() / means.len() as f64;
    ((mean * 10.0).round() / 10.0, means.len() as u64)
}

#[derive(Clone)]
pub struct RatingService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl RatingService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Records one party's rating of the other on a completed project.
    #[instrument(skip(self, input), fields(project_id = %project_id, rater_id = %rater_id, rated_user_id = %input.rated_user_id))]
    pub async fn submit_rating(
        &self,
        project_id: Uuid,
        rater_id: Uuid,
        input: NewRating,
    ) -> Result<rating::Model, ServiceError> {
        let project = self.load_project(project_id).await?;
        let direction = check_eligibility(&project, rater_id, input.rated_user_id)?;

        if self
            .find_rating(project_id, rater_id, input.rated_user_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(
                "You have already rated this user for this project".into(),
            ));
        }

        input.scores.validate_for(direction)?;

        let now = Utc::now();
        let scores = input.scores;
        let created = rating::ActiveModel {
            id: Set(Uuid::new_v4()),
            project_id: Set(project_id),
            rater_id: Set(rater_id),
            rated_user_id: Set(input.rated_user_id),
            output_quality: Set(scores.output_quality),
            execution_efficiency: Set(scores.execution_efficiency),
            compliance: Set(scores.compliance),
            requirement_clarity: Set(scores.requirement_clarity),
            communication: Set(scores.communication),
            comment: Set(normalize_comment(input.comment)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| map_unique_violation(e, "Rating"))?;

        info!(rating_id = %created.id, "rating submitted");
        self.event_sender
            .send_or_log(Event::RatingSubmitted {
                project_id,
                rater_id,
                rated_user_id: created.rated_user_id,
            })
            .await;
        Ok(created)
    }

    /// Patches an existing rating under the same rules as submission.
    #[instrument(skip(self, patch), fields(project_id = %project_id, rater_id = %rater_id))]
    pub async fn update_rating(
        &self,
        project_id: Uuid,
        rater_id: Uuid,
        patch: RatingPatch,
    ) -> Result<rating::Model, ServiceError> {
        let project = self.load_project(project_id).await?;
        let direction = check_eligibility(&project, rater_id, patch.rated_user_id)?;

        let existing = self
            .find_rating(project_id, rater_id, patch.rated_user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Rating not found".into()))?;

        let merged = RatingScores::from(&existing).merged_with(&patch.scores);
        merged.validate_for(direction)?;

        let mut active: rating::ActiveModel = existing.into();
        active.output_quality = Set(merged.output_quality);
        active.execution_efficiency = Set(merged.execution_efficiency);
        active.compliance = Set(merged.compliance);
        active.requirement_clarity = Set(merged.requirement_clarity);
        active.communication = Set(merged.communication);
        if patch.comment.is_some() {
            active.comment = Set(normalize_comment(patch.comment));
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(&*self.db).await?)
    }

    /// The rating `rater_id` left on a project.
    pub async fn get_rating(
        &self,
        project_id: Uuid,
        rater_id: Uuid,
    ) -> Result<rating::Model, ServiceError> {
        rating::Entity::find()
            .filter(rating::Column::ProjectId.eq(project_id))
            .filter(rating::Column::RaterId.eq(rater_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Rating not found".into()))
    }

    pub async fn average_rating(&self, user_id: Uuid) -> Result<RatingSummary, ServiceError> {
        let received = rating::Entity::find()
            .filter(rating::Column::RatedUserId.eq(user_id))
            .all(&*self.db)
            .await?;
        let (average, count) = average_of(&received);
        Ok(RatingSummary {
            user_id,
            average,
            count,
        })
    }

    /// Ratings a user received, newest first.
    pub async fn list_reviews(&self, user_id: Uuid) -> Result<Vec<rating::Model>, ServiceError> {
        Ok(rating::Entity::find()
            .filter(rating::Column::RatedUserId.eq(user_id))
            .order_by_desc(rating::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn load_project(&self, project_id: Uuid) -> Result<project::Model, ServiceError> {
        project::Entity::find_by_id(project_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Project", project_id))
    }

    async fn find_rating(
        &self,
        project_id: Uuid,
        rater_id: Uuid,
        rated_user_id: Uuid,
    ) -> Result<Option<rating::Model>, ServiceError> {
        Ok(rating::Entity::find()
            .filter(rating::Column::ProjectId.eq(project_id))
            .filter(rating::Column::RaterId.eq(rater_id))
            .filter(rating::Column::RatedUserId.eq(rated_user_id))
            .one(&*self.db)
            .await?)
    }
}

/// Completed project, rater is a party, rated is the other party.
fn check_eligibility(
    project: &project::Model,
    rater_id: Uuid,
    rated_user_id: Uuid,
) -> Result<RatingDirection, ServiceError> {
    if project.status != ProjectStatus::Completed {
        return Err(ServiceError::InvalidState(
            "Only completed projects can be rated".into(),
        ));
    }
    let direction = RatingDirection::for_rater(project, rater_id).ok_or_else(|| {
        ServiceError::Forbidden("Only the project's client or contractor can rate".into())
    })?;
    if direction.counterpart(project) != Some(rated_user_id) {
        return Err(ServiceError::ValidationError(
            "The rated user must be the other party of the project".into(),
        ));
    }
    Ok(direction)
}

fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}
