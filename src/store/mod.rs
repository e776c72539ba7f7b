pub mod sqlite;

pub use sqlite::{NewToken, SqlStore, Tables, TokenRow};
