// Core module - Link engine
pub mod link;
