pub mod conversation;
pub mod memory;
pub mod similarity;
pub mod text;
pub mod trigger;
