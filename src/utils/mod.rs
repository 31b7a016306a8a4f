pub mod breaker;
pub mod error;
pub mod similarity;
pub mod text;
pub mod token_estimator;

pub use error::{CoreError, CoreResult};
pub use similarity::cosine_similarity;
