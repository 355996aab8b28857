// Supplier risk scoring over procurement CSV exports.
//
// Raw rows are mapped onto a fixed set of canonical procurement fields,
// coerced into typed `types::CanonicalRecord`s and aggregated into
// per-supplier risk scores, monthly trends, issue lists and exception sets.
//
// The engine modules (`util`, `mapping`, `loader`, `outliers`, `metrics`,
// `reports`, `filter`) never fail on bad data: unreadable values become
// `None`. Files are only touched by `loader::read_csv`, `session`, `config`
// and `output`.
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod mapping;
pub mod metrics;
pub mod outliers;
pub mod output;
pub mod reports;
pub mod session;
pub mod types;
pub mod util;

pub use error::{Result, RiskError};
