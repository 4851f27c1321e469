//! Admin console pages built on `resource_machine`: the REST service they
//! share plus the login form, blob-store form and privilege list.

pub mod blob_store;
pub mod error;
pub mod http;
pub mod login;
pub mod privileges;

pub use error::PageError;
pub use http::{http_client, HttpResource, ResourceMode};
