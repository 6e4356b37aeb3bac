//! Config loaders: turn an external representation (a YAML document, or a
//! cluster-native object graph) into the unified `Config` model.

pub mod document;
pub mod object_store;

pub use document::{DocumentLoader, EnvReader, MapEnvReader, ProcessEnvReader};
pub use object_store::{ObjectRef, ObjectStoreClient, ObjectStoreLoader};
