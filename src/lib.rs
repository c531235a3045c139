pub mod archive;
pub mod config;
pub mod covariates;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod manifest;
pub mod store;

pub use config::FetchRequest;
pub use dataset::{OasisVbmBundle, fetch_oasis_vbm};
pub use error::OasisError;
