pub mod config;
pub mod error;
pub mod value;

pub use error::*;
pub use value::{render_cell, render_row, CellValue, ColumnKind};
