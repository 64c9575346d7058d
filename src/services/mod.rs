// Identity
pub mod users;

// Project lifecycle and the artifact history it drives
pub mod ledger;
pub mod projects;

// Bidding
pub mod proposals;

// Review and feedback
pub mod issues;
pub mod messages;
pub mod ratings;
