pub mod json_loader;

pub use json_loader::{dataset_parent_dir, load_dataset};
