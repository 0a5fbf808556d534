pub mod command;
pub mod feedback;
pub mod parser;
