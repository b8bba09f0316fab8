pub mod deck;
pub mod page_aggregate;
pub mod tier;
pub mod view_event;
