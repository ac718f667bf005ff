//! The standard search stages, in their pipeline order.

mod author;
mod doi;
mod exact_title;
mod keyword;
mod semantic;

pub use author::AuthorStage;
pub use doi::DoiStage;
pub use exact_title::ExactTitleStage;
pub use keyword::KeywordStage;
pub use semantic::SemanticStage;
