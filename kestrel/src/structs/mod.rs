pub mod locations;
pub mod rules;
