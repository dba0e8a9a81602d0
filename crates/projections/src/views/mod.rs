//! Read model views.

pub mod organizations;

pub use organizations::{OrganizationSummary, OrganizationView};
