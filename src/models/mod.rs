pub mod finding;
pub mod fuzz_result;
pub mod jwt;
pub mod scan_result;

pub use finding::*;
pub use fuzz_result::*;
pub use jwt::*;
pub use scan_result::*;
