pub mod history;
pub mod stabilizer;
pub mod tools;
