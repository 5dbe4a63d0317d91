mod value;
pub use value::*;

mod types;
pub use types::*;

mod string;
pub use string::*;

mod state;
pub use state::*;

mod heap;
pub use heap::*;
