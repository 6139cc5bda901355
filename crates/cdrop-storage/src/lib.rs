//! cdrop-storage: object-store reads (OpenDAL) and the upload/delete endpoint client

pub mod fetch;
pub mod operator;
pub mod upload;

pub use fetch::{ObjectFetcher, OperatorFetcher};
pub use operator::{build_from_config, build_gateway_operator, build_memory_operator, build_s3_operator};
pub use upload::UploadClient;
