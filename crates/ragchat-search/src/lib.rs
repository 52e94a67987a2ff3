pub mod decode;
pub mod elasticsearch;

pub mod mock;

pub use elasticsearch::{ElasticsearchBackend, ElasticsearchConfig, EsAuth};
pub use mock::MockSearchBackend;
