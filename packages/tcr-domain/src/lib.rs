pub mod fuzzy;
pub mod identifiers;
pub mod lexicon;
pub mod normalize;
pub mod query;
pub mod similarity;

pub use fuzzy::fuzzy_match;
pub use identifiers::{Extraction, IdentifierExtractor};
pub use lexicon::Lexicon;
pub use normalize::normalize;
pub use query::{PreprocessOptions, QueryPlan, QueryPreprocessor, QueryVariant, VariantProvenance};
pub use similarity::SimilarityMeasure;
