pub mod console;
pub mod junit;
