pub mod memory;
pub mod mongo;

pub use memory::InMemoryCredentialStore;
pub use mongo::MongoCredentialStore;
