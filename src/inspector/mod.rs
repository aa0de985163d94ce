pub mod store;

pub use store::{InspectorCursor, ListParams, Page, list_anomalies, list_processed_events};
