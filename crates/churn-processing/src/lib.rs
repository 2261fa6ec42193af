//! Churn data processing library.
//!
//! Turns a raw customer table into a model-ready numeric matrix, built on
//! Polars.
//!
//! # Overview
//!
//! - **Row sources**: CSV/Parquet files or in-memory frames, with
//!   required-column validation ([`source`])
//! - **Cleaning**: imputation, value normalization, type coercion and
//!   de-duplication with a before/after report ([`cleaner`])
//! - **Feature derivation**: derived churn signals, label encoding, standard
//!   scaling and projection to a dense matrix ([`features`])
//! - **Synthetic data**: a reproducible telco dataset with a known churn
//!   model ([`synthetic`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use churn_processing::{
//!     Cleaner, DatasetSchema, FeatureDeriver, FileRowSource, RowSource, TelcoCleaner,
//!     TelcoFeatureDeriver,
//! };
//!
//! let schema = DatasetSchema::default();
//! let mut source = FileRowSource::new("data/telco_customer_churn.csv", schema.clone());
//! let raw = source.load()?;
//! assert!(source.validate(&raw));
//!
//! let mut cleaner = TelcoCleaner::new(schema.clone());
//! let cleaned = cleaner.clean(raw)?;
//!
//! let mut deriver = TelcoFeatureDeriver::new(schema);
//! let matrix = deriver.derive(cleaned)?;
//! println!("{} features", matrix.n_features());
//! ```

pub mod cleaner;
pub mod error;
pub mod features;
pub mod schema;
pub mod source;
pub mod synthetic;
pub mod utils;

pub use cleaner::{Cleaner, CleaningReport, FillValues, TelcoCleaner};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use features::{
    FeatureDeriver, FeatureInfo, FeatureMatrix, LabelMap, StandardScaler, TelcoFeatureDeriver,
};
pub use schema::DatasetSchema;
pub use source::{FileRowSource, FrameSource, RowSource, validate_frame};
pub use synthetic::generate_churn_dataset;
