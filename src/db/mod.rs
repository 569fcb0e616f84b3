pub mod connection;
pub mod schema;

pub use connection::{init_db, load_db_config, DbConfig, LgDb};
pub use schema::apply_schema;
