pub mod error;
pub mod similarity;
pub mod token_estimator;

pub use error::ChatError;
pub use similarity::cosine_similarity;
