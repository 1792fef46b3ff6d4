pub mod count;
pub mod fetch;
pub mod simulate;
