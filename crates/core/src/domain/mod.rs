pub mod bant;
pub mod conversation;
pub mod lead;
pub mod score;
pub mod stage;
pub mod stage_data;
pub mod turn;
