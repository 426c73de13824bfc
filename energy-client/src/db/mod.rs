pub mod profile_queries;
pub mod reading_queries;
