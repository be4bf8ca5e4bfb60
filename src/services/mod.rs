pub mod client_factory;
pub mod opendal_client;
pub mod storage_client;
pub mod transfer;
