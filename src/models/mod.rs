pub mod group;
pub mod language;
pub mod loaders;
pub mod record;

pub use group::QuestionGroup;
pub use language::language_order;
pub use loaders::load_dataset;
pub use record::QuestionRecord;
