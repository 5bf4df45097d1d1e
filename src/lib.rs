//! Interactive explorer for single-cell embeddings: dataset ingestion, a
//! pan/zoom camera, expression color mapping, spatial selection and cluster
//! annotation, with an egui front end.

pub mod annotate;
pub mod app;
pub mod camera;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod expr;
pub mod filter;
pub mod ingest;
pub mod memo;
pub mod palette;
pub mod render;
pub mod selection;
pub mod settings;
pub mod state;
pub mod stats;

pub use config::ExplorerConfig;
pub use data::Dataset;
pub use state::Explorer;
