mod algorithm;
mod association;
mod memory;
mod response;
mod signatory;
mod store;

pub use algorithm::Algorithm;
pub use association::{Association, AssociationClass, FieldSource};
pub use memory::MemoryStore;
pub use response::Response;
pub use signatory::{DUMB_LIFETIME_SECS, SMART_LIFETIME_SECS, Signatory};
pub use store::AssociationStore;
