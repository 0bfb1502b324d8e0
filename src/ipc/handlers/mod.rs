pub mod assessments;
pub mod care_plans;
pub mod catalog;
pub mod core;
pub mod reconciliation;
pub mod reports;
