pub mod ai;
pub mod collision;
pub mod movement;
pub mod shells;
pub mod trees;
pub mod upgrades;
