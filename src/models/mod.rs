pub mod blacklist;
pub mod owner;
pub mod token;
