pub mod prompt;
pub mod session;
pub mod tools;
