pub mod chain_manager;

pub use chain_manager::{ChainTransition, MartingaleChainManager};
