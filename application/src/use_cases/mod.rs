//! Use cases (application services)

pub mod coordinate_cohort;
pub mod recover_orphans;
pub mod supervise_worker;
