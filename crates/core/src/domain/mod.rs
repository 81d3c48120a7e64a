pub mod fact;
pub mod scope;
pub mod territory;
