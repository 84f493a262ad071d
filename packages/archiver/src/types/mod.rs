//! Domain data types.

pub mod company;
pub mod config;
pub mod job;

pub use company::CompanyRecord;
pub use config::{FetchConfig, PipelineConfig, YearRange};
pub use job::{
    DocumentKind, DocumentLink, DocumentRef, FailedDocument, FetchJob, FetchResult, JobStatus,
};
