pub mod block;
pub mod master;
