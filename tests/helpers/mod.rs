pub mod cli;
pub mod mock_store;
