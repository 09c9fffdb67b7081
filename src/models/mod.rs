pub mod driver;
pub mod order;
pub mod restaurant;
