pub mod meta;
pub mod table;
