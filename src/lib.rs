//! Toggle, tag and event handling for the switchyard feature toggle server.
//!
//! The HTTP surface lives in the `switchyard-cli` crate; everything here is
//! usable on its own, e.g. to script imports against a sled data directory.
//!
//! ```
//! use switchyard_lib::model::FeatureDefinition;
//! use switchyard_lib::service::FeatureToggleService;
//! use switchyard_lib::store::Stores;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let features = FeatureToggleService::new(Stores::memory());
//!     let toggle = features
//!         .create(FeatureDefinition::with_default_strategy("welcome.banner"), "docs")
//!         .await
//!         .unwrap();
//!     assert!(!toggle.enabled);
//! });
//! ```

pub mod error;
pub mod event;
pub mod model;
pub mod service;
pub mod store;
pub mod validation;

pub use error::{StoreError, ToggleError};
pub use event::{Event, EventType};
pub use model::{FeatureDefinition, FeatureQuery, FeatureToggle, Strategy, Tag, Variant};
pub use service::{FeatureToggleService, StateService, TagService, ToggleAction};
pub use store::Stores;
