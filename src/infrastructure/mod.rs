pub mod unit_executor;

pub use unit_executor::UnitExecutor;
