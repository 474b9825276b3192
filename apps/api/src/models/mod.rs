pub mod faculty;
pub mod outreach;
pub mod profile;
pub mod run;
