pub mod common;
pub mod mssql;
pub mod mysql;
pub mod postgres;
