mod error;
mod partition_by;
mod schema;

pub use error::{Result, ZolaError};
pub use partition_by::PartitionBy;
pub use schema::{
    ColumnDef, ColumnSlice, ColumnType, ColumnVec, Schema, NULL_BOOL, NULL_F64, NULL_I64,
    NULL_SYMBOL,
};
