pub mod error;
pub mod kvform;
pub mod protocol;
pub mod server;
pub mod signing;

pub use error::{ProviderServerError, SignatoryError};
pub use server::{AppState, router, run};
pub use signing::{
    Algorithm, Association, AssociationClass, AssociationStore, MemoryStore, Response, Signatory,
};
