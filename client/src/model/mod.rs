pub mod attestation;
pub mod genesis;
pub mod head;
pub mod spec;
pub mod syncing;
pub mod validator;
pub mod version;
