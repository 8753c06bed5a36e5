pub mod logs;
pub mod rules;
