pub mod row;
pub mod series;
