pub mod pg;

pub use pg::{
    column_defs, copy_in_sql, create_table_sql, drop_table_sql, pg_type, quote_ident,
    COPY_NULL,
};
