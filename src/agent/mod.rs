pub mod engine;
pub mod memory;
pub mod registry;
pub mod tools;

#[cfg(test)]
pub mod testing;
