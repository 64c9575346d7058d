pub mod issue;
pub mod issue_comment;
pub mod message;
pub mod project;
pub mod proposal;
pub mod proposal_file;
pub mod rating;
pub mod submission_version;
pub mod user;

pub use issue::IssueStatus;
pub use project::ProjectStatus;
pub use user::UserRole;
