// * Ingestion: tail the beacon log, extract payloads, classify pages

pub mod classifier;
pub mod parser;
pub mod payload;
pub mod tailer;

pub use classifier::{Classifier, PageClassification, PageRule, PageType};
pub use parser::{EventParser, SharedLineReceiver, VisitEvent};
pub use payload::{TrackingPayload, VisitorId};
pub use tailer::{TailError, Tailer};
