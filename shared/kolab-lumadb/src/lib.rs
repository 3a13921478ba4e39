//! Kolab LumaDB Client
//!
//! PostgreSQL wire-protocol client used by Kolab services: connection
//! pooling plus a generic JSON-record insert for tables whose schema is an
//! external contract.

mod error;
mod insert;
mod pool;

pub use error::{LumaDbError, Result};
pub use insert::{insert_statement, is_valid_identifier};
pub use pool::{LumaDbPool, PoolConfig};
