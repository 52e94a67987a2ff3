pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod retrieval;
pub mod search;
pub mod stream;
pub mod tokens;
