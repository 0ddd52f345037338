pub mod result_set;
pub mod value;

pub use result_set::ResultSet;
pub use value::Value;
