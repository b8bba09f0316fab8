pub mod clock;
pub mod jwt;
pub mod visitor_id;
