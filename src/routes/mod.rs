pub mod remote_methods;
#[allow(clippy::module_inception)]
pub mod routes;
