pub mod expense;
pub mod site;
