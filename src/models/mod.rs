pub mod destination;
pub mod meeting;
