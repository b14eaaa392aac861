pub mod block;
pub mod consensus;
pub mod vote_data;
