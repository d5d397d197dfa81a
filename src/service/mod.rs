pub mod feature;
pub mod state;
pub mod tag;

pub use feature::{FeatureToggleService, ToggleAction};
pub use state::{FeatureTagLink, ImportSummary, StateDocument, StateService};
pub use tag::TagService;
