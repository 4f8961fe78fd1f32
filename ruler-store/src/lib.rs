pub mod block;
pub mod error;
pub mod metrics;
pub mod proto;
pub mod shipper;
pub mod storage;
pub mod store_server;
pub mod tsdb;

pub use error::Error;
pub use proto::thanos_ruler::store::store_server::StoreServer;
pub use shipper::Shipper;
pub use store_server::StoreService;
pub use tsdb::{Appender, Matcher, SeriesData, Tsdb};
