pub mod concurrent_index;
pub mod privileged;
pub mod revert;
pub mod upgrade;
